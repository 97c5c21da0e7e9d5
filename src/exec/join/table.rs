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
//! Per-disjunct join hash table.
//!
//! Responsibilities:
//! - Binds the key table (packed key -> cell id) to the cell payloads: a
//!   single row, an insertion-ordered row chain, or an ASOF series.
//! - Owns the chain link array; row ids are global across all build chunks.

use std::mem;

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;

use crate::common::error::{JoinError, Result};
use crate::exec::hash_table::key_packer::{AsofKeyType, KeyArrayView};
use crate::exec::hash_table::key_table::KeyTable;
use crate::exec::hash_table::key_variant::{JoinKeyVariant, KeyLayout};
use crate::exec::join::desc::MappedShape;
use crate::exec::join::row::{AsofSeries, CellValue, ROW_NONE};

pub(crate) struct JoinHashTable {
    key_table: KeyTable,
    shape: MappedShape,
    asof_type: Option<AsofKeyType>,
    cells: Vec<CellValue>,
    row_next: Vec<u32>,
}

impl JoinHashTable {
    pub(crate) fn new(
        variant: JoinKeyVariant,
        layout: KeyLayout,
        key_types: &[DataType],
        shape: MappedShape,
        asof_type: Option<AsofKeyType>,
    ) -> Result<Self> {
        if shape == MappedShape::Asof && asof_type.is_none() {
            return Err(JoinError::logical("ASOF join table without an ASOF key"));
        }
        Ok(Self {
            key_table: KeyTable::new(variant, layout, key_types)?,
            shape,
            asof_type,
            cells: Vec::new(),
            row_next: Vec::new(),
        })
    }

    pub(crate) fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn cell(&self, cell: u32) -> &CellValue {
        &self.cells[cell as usize]
    }

    /// Insert one build chunk's keys. `base_row` is the global row id of the
    /// chunk's first row; `asof_view` reads the trailing ASOF key column and
    /// must be present exactly for ASOF tables.
    pub(crate) fn insert_build_rows(
        &mut self,
        key_arrays: &[ArrayRef],
        asof_view: Option<&KeyArrayView<'_>>,
        skip: Option<&[bool]>,
        rows: usize,
        base_row: u32,
        any_take_last_row: bool,
    ) -> Result<()> {
        if self.shape == MappedShape::Asof && asof_view.is_none() {
            return Err(JoinError::logical("ASOF insert without an ASOF key column"));
        }
        let new_len = base_row as usize + rows;
        if self.row_next.len() < new_len {
            self.row_next.resize(new_len, ROW_NONE);
        }

        let cells = &mut self.cells;
        let row_next = &mut self.row_next;
        let shape = self.shape;
        let asof_type = self.asof_type;
        let mut deferred: Result<()> = Ok(());

        self.key_table
            .insert_keys(key_arrays, skip, rows, |row, lookup| {
                if deferred.is_err() {
                    return;
                }
                let row_id = base_row + row as u32;
                let cell_slot = lookup.cell as usize;
                match shape {
                    MappedShape::Single => {
                        if lookup.is_new {
                            cells.push(CellValue::Single(row_id));
                        } else if any_take_last_row {
                            cells[cell_slot] = CellValue::Single(row_id);
                        }
                    }
                    MappedShape::Chain => {
                        if lookup.is_new {
                            cells.push(CellValue::Chain {
                                head: row_id,
                                tail: row_id,
                            });
                        } else if let CellValue::Chain { tail, .. } = &mut cells[cell_slot] {
                            row_next[*tail as usize] = row_id;
                            *tail = row_id;
                        }
                    }
                    MappedShape::Asof => {
                        if lookup.is_new {
                            let key_type = asof_type.expect("ASOF key type checked above");
                            cells.push(CellValue::Asof(AsofSeries::new(key_type)));
                        }
                        let CellValue::Asof(series) = &mut cells[cell_slot] else {
                            deferred = Err(JoinError::logical("non-ASOF cell in ASOF table"));
                            return;
                        };
                        let view = asof_view.expect("ASOF view checked above");
                        match view.asof_value(row) {
                            Ok(value) => {
                                if let Err(e) = series.insert(value, row_id) {
                                    deferred = Err(e);
                                }
                            }
                            Err(e) => deferred = Err(e),
                        }
                    }
                }
            })?;
        deferred
    }

    pub(crate) fn lookup(
        &self,
        key_arrays: &[ArrayRef],
        skip: Option<&[bool]>,
        rows: usize,
    ) -> Result<Vec<Option<u32>>> {
        self.key_table.lookup_keys(key_arrays, skip, rows)
    }

    /// All row ids stored in one cell, in emission order.
    pub(crate) fn cell_rows(&self, cell: u32) -> CellRows<'_> {
        match &self.cells[cell as usize] {
            CellValue::Single(row) => CellRows::One(Some(*row)),
            CellValue::Chain { head, .. } => CellRows::Chain(ChainRows {
                next: *head,
                links: &self.row_next,
            }),
            CellValue::Asof(series) => CellRows::Asof(series.rows().into_iter()),
        }
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        self.key_table.allocated_bytes()
            + self.cells.capacity() * mem::size_of::<CellValue>()
            + self.row_next.capacity() * mem::size_of::<u32>()
    }
}

pub(crate) struct ChainRows<'a> {
    next: u32,
    links: &'a [u32],
}

impl Iterator for ChainRows<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.next == ROW_NONE {
            return None;
        }
        let row = self.next;
        self.next = self.links[row as usize];
        Some(row)
    }
}

pub(crate) enum CellRows<'a> {
    One(Option<u32>),
    Chain(ChainRows<'a>),
    Asof(std::vec::IntoIter<u32>),
}

impl Iterator for CellRows<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            CellRows::One(row) => row.take(),
            CellRows::Chain(iter) => iter.next(),
            CellRows::Asof(iter) => iter.next(),
        }
    }
}
