// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Output assembly helpers shared by probe, cross-join, and non-joined paths.
//!
//! Responsibilities:
//! - Gathers matched build rows across pinned chunks in probe-row order.
//! - Applies the row filter, replication offsets, and nullability promotion
//!   to the probe-side columns.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, UInt32Array, new_null_array};
use arrow::compute::{filter, interleave, nullif, take};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};

use crate::common::error::Result;
use crate::exec::join::row::RowRef;

/// Gather one output column from per-chunk source columns; `None` slots
/// produce NULL. Slot order is preserved, so output rows stay in probe-row
/// order with per-row matches in build-insertion order.
pub(crate) fn gather_rows(
    columns: &[ArrayRef],
    data_type: &DataType,
    slots: &[Option<RowRef>],
) -> Result<ArrayRef> {
    if columns.is_empty() || slots.iter().all(|slot| slot.is_none()) {
        return Ok(new_null_array(data_type, slots.len()));
    }
    let null_row = new_null_array(data_type, 1);
    let mut sources: Vec<&dyn Array> = Vec::with_capacity(columns.len() + 1);
    sources.push(null_row.as_ref());
    for column in columns {
        sources.push(column.as_ref());
    }
    let indices = slots
        .iter()
        .map(|slot| match slot {
            None => (0, 0),
            Some(loc) => (loc.chunk as usize + 1, loc.row as usize),
        })
        .collect::<Vec<_>>();
    Ok(interleave(&sources, &indices)?)
}

/// Expand replication offsets (cumulative output rows per probe row) into
/// take indices repeating row `i` `offsets[i] - offsets[i - 1]` times.
pub(crate) fn replication_indices(offsets: &[u32]) -> UInt32Array {
    let total = offsets.last().copied().unwrap_or(0) as usize;
    let mut indices = Vec::with_capacity(total);
    let mut prev = 0u32;
    for (row, offset) in offsets.iter().enumerate() {
        for _ in prev..*offset {
            indices.push(row as u32);
        }
        prev = *offset;
    }
    UInt32Array::from(indices)
}

pub(crate) fn filter_columns(columns: &[ArrayRef], mask: &[bool]) -> Result<Vec<ArrayRef>> {
    let mask = BooleanArray::from(mask.to_vec());
    columns
        .iter()
        .map(|column| Ok(filter(column.as_ref(), &mask)?))
        .collect()
}

pub(crate) fn take_columns(columns: &[ArrayRef], indices: &UInt32Array) -> Result<Vec<ArrayRef>> {
    columns
        .iter()
        .map(|column| Ok(take(column.as_ref(), indices, None)?))
        .collect()
}

/// NULL out the rows where `keep` is false, leaving the rest untouched.
/// Used to rebuild required right key columns from their left sources.
pub(crate) fn null_masked_column(column: &ArrayRef, keep: &[bool]) -> Result<ArrayRef> {
    let blank = BooleanArray::from(keep.iter().map(|flag| !*flag).collect::<Vec<_>>());
    Ok(nullif(column.as_ref(), &blank)?)
}

pub(crate) fn nullable_field(field: &Field) -> FieldRef {
    Arc::new(Field::new(field.name(), field.data_type().clone(), true))
}

pub(crate) fn schema_from_fields(fields: Vec<FieldRef>) -> SchemaRef {
    Arc::new(Schema::new(fields))
}
