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
//! Core probe loop for keyed hash joins.
//!
//! Responsibilities:
//! - Looks up every probe row through every disjunct's table and applies the
//!   kind/strictness emission rules, tracking the row filter and replication
//!   offsets.
//! - Assembles the joined output chunk: filtered or replicated probe columns,
//!   gathered build columns, and reconstructed right key columns.

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{DataType, FieldRef};
use tracing::trace;

use crate::common::error::{JoinError, Result};
use crate::exec::chunk::Chunk;
use crate::exec::hash_table::key_packer::{KeyArrayView, build_key_views, combined_null_mask};
use crate::exec::join::desc::JoinFeatures;
use crate::exec::join::hash_join::HashJoin;
use crate::exec::join::output::{
    filter_columns, gather_rows, null_masked_column, nullable_field, replication_indices,
    schema_from_fields, take_columns,
};
use crate::exec::join::row::{CellValue, RowRef};
use crate::exec::join::table::JoinHashTable;
use crate::exec::join::used_flags::{FlagScope, UsedFlags};

/// Rows accumulated for the output: one entry per emitted row, `None` for a
/// defaulted (NULL right side) row.
struct AddedRows {
    slots: Vec<Option<u32>>,
    filter: Option<Vec<bool>>,
    offsets: Option<Vec<u32>>,
    current_offset: u32,
}

impl AddedRows {
    fn new(rows: usize, track_filter: bool, need_replication: bool) -> Self {
        Self {
            slots: Vec::with_capacity(rows),
            filter: track_filter.then(|| vec![false; rows]),
            offsets: need_replication.then(|| vec![0u32; rows]),
            current_offset: 0,
        }
    }

    fn set_filter(&mut self, row: usize) {
        if let Some(filter) = &mut self.filter {
            filter[row] = true;
        }
    }

    fn push_row(&mut self, row_id: u32) {
        self.slots.push(Some(row_id));
        self.current_offset += 1;
    }

    fn push_default(&mut self) {
        self.slots.push(None);
        self.current_offset += 1;
    }

    fn close_row(&mut self, row: usize) {
        if let Some(offsets) = &mut self.offsets {
            offsets[row] = self.current_offset;
        }
    }
}

fn mark_cell_used(flags: &UsedFlags, table: &JoinHashTable, cell: u32) {
    match flags.scope() {
        FlagScope::PerCell => flags.set_used(cell as usize),
        FlagScope::PerRow => {
            for row in table.cell_rows(cell) {
                flags.set_used(row as usize);
            }
        }
    }
}

/// First-match race: exactly one probe row wins a cell. In per-row scope the
/// head row arbitrates and the rest of the cell is marked by the winner.
fn mark_cell_used_once(flags: &UsedFlags, table: &JoinHashTable, cell: u32) -> bool {
    match flags.scope() {
        FlagScope::PerCell => flags.set_used_once(cell as usize),
        FlagScope::PerRow => {
            let mut rows = table.cell_rows(cell);
            let Some(head) = rows.next() else {
                return false;
            };
            if !flags.set_used_once(head as usize) {
                return false;
            }
            for row in rows {
                flags.set_used(row as usize);
            }
            true
        }
    }
}

fn check_key_types(arrays: &[ArrayRef], right_types: &[DataType], disjunct: usize) -> Result<()> {
    if arrays.len() != right_types.len() {
        return Err(JoinError::logical(format!(
            "disjunct {disjunct} has {} left keys but {} right keys",
            arrays.len(),
            right_types.len()
        )));
    }
    for (index, (array, right)) in arrays.iter().zip(right_types.iter()).enumerate() {
        if array.data_type() != right {
            return Err(JoinError::TypeMismatch(format!(
                "join key {index} of disjunct {disjunct}: left type {} vs right type {right}",
                array.data_type()
            )));
        }
    }
    Ok(())
}

/// Probe one chunk against the build side. `key_names` is the per-disjunct
/// left key name list (`join_get` passes the right-side names instead).
pub(crate) fn probe_chunk(
    join: &HashJoin,
    chunk: &Chunk,
    key_names: &[Vec<String>],
    added_fields: &[FieldRef],
    required_right_keys: &[(FieldRef, String)],
) -> Result<Chunk> {
    let features = JoinFeatures::new(join.desc.kind, join.desc.strictness);
    let rows = chunk.len();
    let multiple_disjuncts = key_names.len() > 1;

    let mut key_arrays: Vec<Vec<ArrayRef>> = Vec::with_capacity(key_names.len());
    for (d, names) in key_names.iter().enumerate() {
        let mut arrays = Vec::with_capacity(names.len());
        for name in names {
            arrays.push(chunk.column_by_name(name)?);
        }
        check_key_types(&arrays, &join.right_key_types[d], d)?;
        key_arrays.push(arrays);
    }

    // Per disjunct: cell hits, null mask, and the left ASOF key view.
    let mut cells: Vec<Vec<Option<u32>>> = Vec::with_capacity(key_arrays.len());
    let mut nulls: Vec<Option<Vec<bool>>> = Vec::with_capacity(key_arrays.len());
    let mut asof_views: Vec<Option<Vec<KeyArrayView<'_>>>> = Vec::with_capacity(key_arrays.len());
    for (d, arrays) in key_arrays.iter().enumerate() {
        let null_mask = combined_null_mask(arrays, rows);
        let (table_keys, asof_view) = if features.is_asof {
            let (head, tail) = arrays.split_at(arrays.len() - 1);
            (head, Some(build_key_views(tail)?))
        } else {
            (&arrays[..], None)
        };
        let table = &join.data.tables[d];
        cells.push(table.lookup(table_keys, null_mask.as_deref(), rows)?);
        nulls.push(null_mask);
        asof_views.push(asof_view);
    }

    let has_required = !required_right_keys.is_empty();
    let track_filter = features.need_filter || has_required;
    let mut added = AddedRows::new(rows, track_filter, features.need_replication);
    let flags = join.used_flags.as_ref();

    let mut known_rows: Vec<u32> = Vec::new();
    for i in 0..rows {
        let mut right_row_found = false;
        let mut appended_this_row = false;
        if multiple_disjuncts {
            known_rows.clear();
        }

        for d in 0..key_arrays.len() {
            if let Some(mask) = &nulls[d] {
                if mask[i] {
                    // NULL keys never match; the row falls through to the
                    // not-found handling below.
                    continue;
                }
            }
            let Some(cell) = cells[d][i] else {
                continue;
            };
            right_row_found = true;
            let table = &join.data.tables[d];

            if features.is_asof {
                let CellValue::Asof(series) = table.cell(cell) else {
                    return Err(JoinError::logical("non-ASOF cell in ASOF probe"));
                };
                let view = asof_views[d]
                    .as_ref()
                    .map(|views| &views[0])
                    .ok_or_else(|| JoinError::logical("ASOF probe without an ASOF key view"))?;
                match series.find(view.asof_value(i)?, join.desc.asof_inequality) {
                    Some(row_id) => {
                        added.set_filter(i);
                        added.push_row(row_id);
                    }
                    None if features.add_missing => added.push_default(),
                    None => {}
                }
            } else if features.is_all {
                added.set_filter(i);
                mark_cell_used(flags, table, cell);
                for row_id in table.cell_rows(cell) {
                    if multiple_disjuncts {
                        if known_rows.contains(&row_id) {
                            continue;
                        }
                        known_rows.push(row_id);
                    }
                    added.push_row(row_id);
                }
            } else if (features.is_any || features.is_semi) && features.right {
                // Use the first arriving probe row; it takes the whole chain.
                if mark_cell_used_once(flags, table, cell) {
                    added.set_filter(i);
                    for row_id in table.cell_rows(cell) {
                        if multiple_disjuncts {
                            if known_rows.contains(&row_id) {
                                continue;
                            }
                            known_rows.push(row_id);
                        }
                        added.push_row(row_id);
                    }
                }
            } else if features.is_any && features.inner {
                if mark_cell_used_once(flags, table, cell) {
                    added.set_filter(i);
                    if let Some(row_id) = table.cell_rows(cell).next() {
                        added.push_row(row_id);
                    }
                }
                break;
            } else if features.is_anti {
                if features.right && features.need_flags {
                    mark_cell_used(flags, table, cell);
                }
            } else {
                // ANY LEFT, SEMI LEFT, ANY FULL, and legacy RightAny.
                added.set_filter(i);
                mark_cell_used(flags, table, cell);
                if !appended_this_row {
                    if let Some(row_id) = table.cell_rows(cell).next() {
                        added.push_row(row_id);
                        appended_this_row = true;
                    }
                }
                if features.is_any {
                    break;
                }
            }
        }

        if !right_row_found {
            if features.is_anti && features.left {
                added.set_filter(i);
            }
            if features.add_missing {
                added.push_default();
            }
        }
        added.close_row(i);
    }

    trace!(
        "join probe: {} rows in, {} rows out",
        rows,
        added.slots.len()
    );

    let gather_sources = added_fields
        .iter()
        .map(|field| {
            join.data
                .chunks
                .iter()
                .map(|chunk| chunk.column_by_name(field.name()))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    let slot_refs = added
        .slots
        .iter()
        .map(|slot| slot.map(|row_id| join.data.row_loc(row_id)))
        .collect::<Vec<_>>();

    assemble_output(
        join,
        chunk,
        &features,
        added,
        added_fields,
        required_right_keys,
        &gather_sources,
        &slot_refs,
    )
}

/// Probe against an external dictionary: one bulk lookup per chunk, then the
/// LEFT ANY/SEMI/ANTI emission rules over the cached result.
pub(crate) fn probe_dict_chunk(
    join: &HashJoin,
    chunk: &Chunk,
    key_names: &[Vec<String>],
    added_fields: &[FieldRef],
    required_right_keys: &[(FieldRef, String)],
) -> Result<Chunk> {
    let features = JoinFeatures::new(join.desc.kind, join.desc.strictness);
    let rows = chunk.len();
    let reader = join
        .dictionary
        .as_ref()
        .ok_or_else(|| JoinError::logical("dictionary probe without a dictionary reader"))?;

    let names = &key_names[0];
    let mut arrays = Vec::with_capacity(names.len());
    for name in names {
        arrays.push(chunk.column_by_name(name)?);
    }
    check_key_types(&arrays, &join.right_key_types[0], 0)?;
    let null_mask = combined_null_mask(&arrays, rows);

    let lookup = reader.read_keys(&arrays)?;
    if lookup.found.len() != rows || lookup.positions.len() != rows {
        return Err(JoinError::logical(format!(
            "dictionary lookup returned {} entries for {} probe rows",
            lookup.found.len(),
            rows
        )));
    }

    let has_required = !required_right_keys.is_empty();
    let track_filter = features.need_filter || has_required;
    let mut added = AddedRows::new(rows, track_filter, false);
    let mut slot_refs = Vec::with_capacity(rows);

    for i in 0..rows {
        let is_null = null_mask.as_ref().map(|mask| mask[i]).unwrap_or(false);
        let hit = !is_null && lookup.found[i];
        if hit && !features.is_anti {
            added.set_filter(i);
            added.push_row(lookup.positions[i]);
            slot_refs.push(Some(RowRef {
                chunk: 0,
                row: lookup.positions[i],
            }));
        } else if !hit {
            if features.is_anti {
                added.set_filter(i);
            }
            if features.add_missing {
                added.push_default();
                slot_refs.push(None);
            }
        }
    }

    let gather_sources = added_fields
        .iter()
        .map(|field| Ok(vec![lookup.chunk.column_by_name(field.name())?]))
        .collect::<Result<Vec<_>>>()?;

    assemble_output(
        join,
        chunk,
        &features,
        added,
        added_fields,
        required_right_keys,
        &gather_sources,
        &slot_refs,
    )
}

/// Post-loop block assembly: filter or replicate the probe columns, rebuild
/// required right keys from their left sources, and append the gathered
/// build columns.
fn assemble_output(
    join: &HashJoin,
    chunk: &Chunk,
    features: &JoinFeatures,
    added: AddedRows,
    added_fields: &[FieldRef],
    required_right_keys: &[(FieldRef, String)],
    gather_sources: &[Vec<ArrayRef>],
    slot_refs: &[Option<RowRef>],
) -> Result<Chunk> {
    let left_nullable = features.right || features.full || join.desc.force_nullable_left;
    let added_nullable = features.add_missing || join.desc.force_nullable_right;

    let mut left_columns: Vec<ArrayRef> = chunk.columns().to_vec();
    if features.need_filter {
        let filter = added
            .filter
            .as_ref()
            .ok_or_else(|| JoinError::logical("row filter missing for filtering join"))?;
        left_columns = filter_columns(&left_columns, filter)?;
    }

    // Required right keys are equal to their left sources on matched rows;
    // missed rows are blanked out instead of gathered from the build side.
    let mut right_key_columns: Vec<ArrayRef> = Vec::with_capacity(required_right_keys.len());
    for (_, left_source) in required_right_keys {
        let source = chunk.column_by_name(left_source)?;
        let column = if features.need_filter {
            let filter = added
                .filter
                .as_ref()
                .ok_or_else(|| JoinError::logical("row filter missing for filtering join"))?;
            filter_columns(std::slice::from_ref(&source), filter)?.remove(0)
        } else if let Some(filter) = &added.filter {
            null_masked_column(&source, filter)?
        } else {
            source
        };
        right_key_columns.push(column);
    }

    if features.need_replication {
        let offsets = added
            .offsets
            .as_ref()
            .ok_or_else(|| JoinError::logical("replication offsets missing"))?;
        let indices = replication_indices(offsets);
        left_columns = take_columns(&left_columns, &indices)?;
        right_key_columns = take_columns(&right_key_columns, &indices)?;
    }

    let mut added_columns: Vec<ArrayRef> = Vec::with_capacity(added_fields.len());
    for (field, sources) in added_fields.iter().zip(gather_sources.iter()) {
        added_columns.push(gather_rows(sources, field.data_type(), slot_refs)?);
    }

    let mut fields = Vec::with_capacity(
        chunk.schema().fields().len() + added_fields.len() + right_key_columns.len(),
    );
    for field in chunk.schema().fields() {
        fields.push(if left_nullable {
            nullable_field(field)
        } else {
            field.clone()
        });
    }
    for field in added_fields {
        fields.push(if added_nullable {
            nullable_field(field)
        } else {
            field.clone()
        });
    }
    for (field, _) in required_right_keys {
        // Reconstructed keys carry NULLs at unmatched rows unless filtered.
        fields.push(if added_nullable || !features.need_filter {
            nullable_field(field)
        } else {
            field.clone()
        });
    }

    let mut columns = left_columns;
    columns.append(&mut added_columns);
    columns.append(&mut right_key_columns);

    let schema = schema_from_fields(fields);
    let rows = columns.first().map(|c| c.len()).unwrap_or(0);
    let batch = RecordBatch::try_new_with_options(
        schema,
        columns,
        &arrow::array::RecordBatchOptions::new().with_row_count(Some(rows)),
    )?;
    Ok(Chunk::new(batch))
}
