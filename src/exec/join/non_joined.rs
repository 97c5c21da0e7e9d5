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
//! Emission of build rows no probe row matched (RIGHT/FULL kinds).
//!
//! Responsibilities:
//! - Walks every cell of every disjunct table and emits rows whose used-flag
//!   is clear, then drains the NULL-key side list.
//! - Persists its cursor between calls so output is bounded per chunk.

use std::collections::VecDeque;
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, new_null_array};
use arrow::datatypes::FieldRef;

use crate::common::error::Result;
use crate::exec::chunk::Chunk;
use crate::exec::join::build_side::BuildData;
use crate::exec::join::output::gather_rows;
use crate::exec::join::output::schema_from_fields;
use crate::exec::join::row::RowRef;
use crate::exec::join::used_flags::{FlagScope, UsedFlags};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Cells,
    NullRows,
    Done,
}

/// Lazy source of the unmatched build rows, created after probing ends.
/// Left-side columns are NULL-filled; right-side columns come from the
/// pinned build chunks.
pub struct NonJoinedStream {
    data: Arc<BuildData>,
    flags: Arc<UsedFlags>,
    left_fields: Vec<FieldRef>,
    added_fields: Vec<FieldRef>,
    right_key_fields: Vec<FieldRef>,
    max_chunk_size: usize,

    phase: Phase,
    table_index: usize,
    cell_index: usize,
    null_list_index: usize,
    null_row_index: usize,
    pending: VecDeque<RowRef>,
}

impl NonJoinedStream {
    pub(crate) fn new(
        data: Arc<BuildData>,
        flags: Arc<UsedFlags>,
        left_fields: Vec<FieldRef>,
        added_fields: Vec<FieldRef>,
        right_key_fields: Vec<FieldRef>,
        max_chunk_size: usize,
    ) -> Self {
        Self {
            data,
            flags,
            left_fields,
            added_fields,
            right_key_fields,
            max_chunk_size: max_chunk_size.max(1),
            phase: Phase::Cells,
            table_index: 0,
            cell_index: 0,
            null_list_index: 0,
            null_row_index: 0,
            pending: VecDeque::new(),
        }
    }

    /// Collect up to `max_chunk_size` unmatched row locations, advancing the
    /// persistent cursor.
    fn collect_rows(&mut self) -> Vec<RowRef> {
        let mut out = Vec::new();
        loop {
            while out.len() < self.max_chunk_size {
                match self.pending.pop_front() {
                    Some(loc) => out.push(loc),
                    None => break,
                }
            }
            if out.len() >= self.max_chunk_size || self.phase == Phase::Done {
                return out;
            }

            match self.phase {
                Phase::Cells => {
                    if self.table_index >= self.data.tables.len() {
                        self.phase = Phase::NullRows;
                        continue;
                    }
                    let table = &self.data.tables[self.table_index];
                    if self.cell_index >= table.cell_count() {
                        self.table_index += 1;
                        self.cell_index = 0;
                        continue;
                    }
                    let cell = self.cell_index as u32;
                    self.cell_index += 1;
                    match self.flags.scope() {
                        FlagScope::PerCell => {
                            if !self.flags.is_used(cell as usize) {
                                for row_id in table.cell_rows(cell) {
                                    self.pending.push_back(self.data.row_loc(row_id));
                                }
                            }
                        }
                        FlagScope::PerRow => {
                            // Marking on emission dedups rows reachable from
                            // more than one disjunct's table.
                            for row_id in table.cell_rows(cell) {
                                if !self.flags.is_used(row_id as usize) {
                                    self.flags.set_used(row_id as usize);
                                    self.pending.push_back(self.data.row_loc(row_id));
                                }
                            }
                        }
                    }
                }
                Phase::NullRows => {
                    if self.null_list_index >= self.data.null_rows.len() {
                        self.phase = Phase::Done;
                        continue;
                    }
                    let (chunk_index, mask) = &self.data.null_rows[self.null_list_index];
                    if self.null_row_index >= mask.len() {
                        self.null_list_index += 1;
                        self.null_row_index = 0;
                        continue;
                    }
                    let row = self.null_row_index;
                    self.null_row_index += 1;
                    if mask[row] {
                        self.pending.push_back(RowRef {
                            chunk: *chunk_index,
                            row: row as u32,
                        });
                    }
                }
                Phase::Done => unreachable!("handled above"),
            }
        }
    }

    fn emit_chunk(&self, rows: &[RowRef]) -> Result<Chunk> {
        let count = rows.len();
        let slots = rows.iter().map(|loc| Some(*loc)).collect::<Vec<_>>();

        let mut fields =
            Vec::with_capacity(self.left_fields.len() + self.added_fields.len() + self.right_key_fields.len());
        let mut columns: Vec<ArrayRef> =
            Vec::with_capacity(self.left_fields.len() + self.added_fields.len() + self.right_key_fields.len());

        for field in &self.left_fields {
            fields.push(field.clone());
            columns.push(new_null_array(field.data_type(), count));
        }
        for field in self.added_fields.iter().chain(self.right_key_fields.iter()) {
            let sources = self
                .data
                .chunks
                .iter()
                .map(|chunk| chunk.column_by_name(field.name()))
                .collect::<Result<Vec<_>>>()?;
            fields.push(field.clone());
            columns.push(gather_rows(&sources, field.data_type(), &slots)?);
        }

        let batch = RecordBatch::try_new_with_options(
            schema_from_fields(fields),
            columns,
            &arrow::array::RecordBatchOptions::new().with_row_count(Some(count)),
        )?;
        Ok(Chunk::new(batch))
    }
}

impl Iterator for NonJoinedStream {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Result<Chunk>> {
        let rows = self.collect_rows();
        if rows.is_empty() {
            return None;
        }
        Some(self.emit_chunk(&rows))
    }
}
