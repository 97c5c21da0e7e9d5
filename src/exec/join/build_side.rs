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
//! Build side of the join: pinned chunks and per-disjunct hash tables.
//!
//! Responsibilities:
//! - Pins structured build chunks and maps global row ids to chunk rows.
//! - Feeds each disjunct's table, skipping rows with NULL keys, and keeps
//!   the NULL-key side list for RIGHT/FULL emission.

use std::mem;

use arrow::array::ArrayRef;

use tracing::trace;

use crate::common::error::Result;
use crate::exec::chunk::Chunk;
use crate::exec::hash_table::key_packer::{build_key_views, combined_null_mask};
use crate::exec::join::row::RowRef;
use crate::exec::join::table::JoinHashTable;

pub(crate) struct BuildData {
    /// Build chunks in saved-sample layout, pinned for the join's lifetime.
    pub(crate) chunks: Vec<Chunk>,
    /// Global row id -> (chunk, row).
    pub(crate) row_locs: Vec<RowRef>,
    /// One hash table per disjunct, identical in variant.
    pub(crate) tables: Vec<JoinHashTable>,
    /// Chunks with rows whose keys were NULL in every disjunct, with the
    /// per-row mask. Kept only for RIGHT/FULL kinds.
    pub(crate) null_rows: Vec<(u32, Vec<bool>)>,
    pub(crate) rows: usize,
}

impl BuildData {
    pub(crate) fn new(tables: Vec<JoinHashTable>) -> Self {
        Self {
            chunks: Vec::new(),
            row_locs: Vec::new(),
            tables,
            null_rows: Vec::new(),
            rows: 0,
        }
    }

    pub(crate) fn row_loc(&self, row_id: u32) -> RowRef {
        self.row_locs[row_id as usize]
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        let chunk_bytes: usize = self.chunks.iter().map(|c| c.estimated_bytes()).sum();
        let table_bytes: usize = self.tables.iter().map(|t| t.allocated_bytes()).sum();
        chunk_bytes + table_bytes + self.row_locs.capacity() * mem::size_of::<RowRef>()
    }

    /// Pin one structured chunk and insert its keys into every disjunct's
    /// table. `disjunct_keys[d]` holds disjunct `d`'s key columns including
    /// the trailing ASOF column when `is_asof`.
    pub(crate) fn add_chunk(
        &mut self,
        structured: Chunk,
        disjunct_keys: &[Vec<ArrayRef>],
        is_asof: bool,
        save_null_rows: bool,
        any_take_last_row: bool,
    ) -> Result<()> {
        let rows = structured.len();
        let base_row = self.rows as u32;
        let chunk_index = self.chunks.len() as u32;

        // Rows absent from every disjunct's table; only those are emitted
        // from the side list, so probe output, non-joined output, and the
        // side list partition the build rows.
        let mut all_null = save_null_rows.then(|| vec![true; rows]);

        for (keys, table) in disjunct_keys.iter().zip(self.tables.iter_mut()) {
            let null_mask = combined_null_mask(keys, rows);
            match (&mut all_null, &null_mask) {
                (Some(acc), Some(mask)) => {
                    for (flag, is_null) in acc.iter_mut().zip(mask.iter()) {
                        *flag &= *is_null;
                    }
                }
                (Some(acc), None) => acc.iter_mut().for_each(|flag| *flag = false),
                (None, _) => {}
            }

            let (table_keys, asof_views) = if is_asof {
                let (head, tail) = keys.split_at(keys.len() - 1);
                (head, Some(build_key_views(tail)?))
            } else {
                (&keys[..], None)
            };
            table.insert_build_rows(
                table_keys,
                asof_views.as_deref().map(|views| &views[0]),
                null_mask.as_deref(),
                rows,
                base_row,
                any_take_last_row,
            )?;
        }

        if let Some(mask) = all_null {
            if mask.iter().any(|flag| *flag) {
                self.null_rows.push((chunk_index, mask));
            }
        }

        self.row_locs.reserve(rows);
        for row in 0..rows {
            self.row_locs.push(RowRef {
                chunk: chunk_index,
                row: row as u32,
            });
        }
        self.chunks.push(structured);
        self.rows += rows;
        trace!(
            "join build: pinned chunk {} with {} rows, {} total",
            chunk_index, rows, self.rows
        );
        Ok(())
    }
}
