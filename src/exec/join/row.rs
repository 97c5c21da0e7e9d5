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
use std::cmp::Ordering;

use crate::common::error::{JoinError, Result};
use crate::exec::hash_table::key_packer::{AsofKeyType, AsofValue};
use crate::exec::join::desc::AsofInequality;

/// Marker for "no row" in chain links.
pub(crate) const ROW_NONE: u32 = u32::MAX;

/// Location of one build-side row: index of the pinned chunk plus the row
/// offset inside it. Build chunks are immutable once pinned, so a RowRef
/// stays valid for the lifetime of the owning join.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct RowRef {
    pub(crate) chunk: u32,
    pub(crate) row: u32,
}

/// Payload of one hash-table cell.
#[derive(Clone, Debug)]
pub(crate) enum CellValue {
    /// One row id; replaced on duplicate keys iff `any_take_last_row`.
    Single(u32),
    /// Insertion-ordered list of row ids linked through `row_next`.
    Chain { head: u32, tail: u32 },
    /// Rows ordered by the trailing ASOF key.
    Asof(AsofSeries),
}

/// Per-cell ordered series for ASOF lookup, keyed by the trailing key column.
#[derive(Clone, Debug)]
pub(crate) enum AsofSeries {
    Int(Vec<(i64, u32)>),
    UInt(Vec<(u64, u32)>),
    Float(Vec<(f64, u32)>),
}

impl AsofSeries {
    pub(crate) fn new(key_type: AsofKeyType) -> Self {
        match key_type {
            AsofKeyType::Int64 => AsofSeries::Int(Vec::new()),
            AsofKeyType::UInt64 => AsofSeries::UInt(Vec::new()),
            AsofKeyType::Float64 => AsofSeries::Float(Vec::new()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            AsofSeries::Int(v) => v.len(),
            AsofSeries::UInt(v) => v.len(),
            AsofSeries::Float(v) => v.len(),
        }
    }

    pub(crate) fn insert(&mut self, value: AsofValue, row: u32) -> Result<()> {
        match (self, value) {
            (AsofSeries::Int(v), AsofValue::Int(key)) => insert_sorted(v, key, row, i64::cmp),
            (AsofSeries::UInt(v), AsofValue::UInt(key)) => insert_sorted(v, key, row, u64::cmp),
            (AsofSeries::Float(v), AsofValue::Float(key)) => {
                insert_sorted(v, key, row, |a: &f64, b: &f64| a.total_cmp(b))
            }
            _ => {
                return Err(JoinError::logical(
                    "ASOF value type does not match the series",
                ));
            }
        }
        Ok(())
    }

    /// Find the row satisfying the inequality against `value`:
    /// the greatest key `< value` (`Less`), `<= value` (`LessOrEquals`),
    /// or the smallest key `> value` (`Greater`), `>= value`
    /// (`GreaterOrEquals`).
    pub(crate) fn find(&self, value: AsofValue, inequality: AsofInequality) -> Option<u32> {
        match (self, value) {
            (AsofSeries::Int(v), AsofValue::Int(key)) => search(v, key, inequality, i64::cmp),
            (AsofSeries::UInt(v), AsofValue::UInt(key)) => search(v, key, inequality, u64::cmp),
            (AsofSeries::Float(v), AsofValue::Float(key)) => {
                search(v, key, inequality, |a: &f64, b: &f64| a.total_cmp(b))
            }
            _ => None,
        }
    }

    pub(crate) fn rows(&self) -> Vec<u32> {
        match self {
            AsofSeries::Int(v) => v.iter().map(|(_, row)| *row).collect(),
            AsofSeries::UInt(v) => v.iter().map(|(_, row)| *row).collect(),
            AsofSeries::Float(v) => v.iter().map(|(_, row)| *row).collect(),
        }
    }
}

fn insert_sorted<T: Copy>(
    series: &mut Vec<(T, u32)>,
    key: T,
    row: u32,
    cmp: impl Fn(&T, &T) -> Ordering,
) {
    let pos = series.partition_point(|(existing, _)| cmp(existing, &key) == Ordering::Less);
    series.insert(pos, (key, row));
}

fn search<T: Copy>(
    series: &[(T, u32)],
    key: T,
    inequality: AsofInequality,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Option<u32> {
    match inequality {
        AsofInequality::Less => {
            let idx = series.partition_point(|(v, _)| cmp(v, &key) == Ordering::Less);
            idx.checked_sub(1).map(|i| series[i].1)
        }
        AsofInequality::LessOrEquals => {
            let idx = series.partition_point(|(v, _)| cmp(v, &key) != Ordering::Greater);
            idx.checked_sub(1).map(|i| series[i].1)
        }
        AsofInequality::Greater => {
            let idx = series.partition_point(|(v, _)| cmp(v, &key) != Ordering::Greater);
            series.get(idx).map(|(_, row)| *row)
        }
        AsofInequality::GreaterOrEquals => {
            let idx = series.partition_point(|(v, _)| cmp(v, &key) == Ordering::Less);
            series.get(idx).map(|(_, row)| *row)
        }
    }
}
