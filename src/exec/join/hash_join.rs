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
//! Hash join facade.
//!
//! Responsibilities:
//! - Validates the descriptor, picks the hash variant, and derives the
//!   added/required output columns from the two sample schemas.
//! - Drives the build phase (single writer) and the probe phase (shared,
//!   lock-free apart from the used-flag atomics).
//!
//! Key exported interfaces:
//! - Types: `HashJoin`.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use tracing::debug;

use crate::common::error::{JoinError, Result};
use crate::exec::chunk::Chunk;
use crate::exec::hash_table::key_packer::asof_key_type;
use crate::exec::hash_table::key_variant::{JoinKeyVariant, KeyLayout, choose_key_variant};
use crate::exec::join::build_side::BuildData;
use crate::exec::join::cross::{CrossJoinResume, cross_join_chunk};
use crate::exec::join::desc::{JoinDesc, JoinFeatures, JoinKind, JoinStrictness, mapped_shape};
use crate::exec::join::dict::DictionaryReader;
use crate::exec::join::non_joined::NonJoinedStream;
use crate::exec::join::output::nullable_field;
use crate::exec::join::probe::{probe_chunk, probe_dict_chunk};
use crate::exec::join::table::JoinHashTable;
use crate::exec::join::used_flags::{FlagScope, UsedFlags};
use crate::runtime::mem_tracker::MemTracker;

/// One hash join: owns the build arena, the per-disjunct hash tables, and
/// the used-flags, from construction until the last probe completes.
pub struct HashJoin {
    pub(crate) desc: JoinDesc,
    pub(crate) variant: JoinKeyVariant,
    pub(crate) left_sample: SchemaRef,
    pub(crate) right_sample: SchemaRef,
    /// Layout of the pinned build chunks: key columns plus added columns.
    pub(crate) saved_sample: SchemaRef,
    /// Right-side columns appended to probe output (ASOF key included).
    pub(crate) added_fields: Vec<FieldRef>,
    /// Right key columns reconstructed from their left sources, as
    /// `(right field, left source name)`.
    pub(crate) required_right_keys: Vec<(FieldRef, String)>,
    pub(crate) right_key_types: Vec<Vec<DataType>>,
    pub(crate) data: Arc<BuildData>,
    pub(crate) used_flags: Arc<UsedFlags>,
    pub(crate) dictionary: Option<Arc<dyn DictionaryReader>>,
    probe_started: AtomicBool,
    mem_tracker: Arc<MemTracker>,
    accounted_bytes: i64,
}

impl std::fmt::Debug for HashJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashJoin")
            .field("desc", &self.desc)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

impl HashJoin {
    pub fn try_create(
        desc: JoinDesc,
        left_sample: SchemaRef,
        right_sample: SchemaRef,
        dictionary: Option<Arc<dyn DictionaryReader>>,
    ) -> Result<Self> {
        if desc.key_names_left.len() != desc.key_names_right.len() {
            return Err(JoinError::logical(format!(
                "left key set has {} disjuncts, right has {}",
                desc.key_names_left.len(),
                desc.key_names_right.len()
            )));
        }
        for (d, (left, right)) in desc
            .key_names_left
            .iter()
            .zip(desc.key_names_right.iter())
            .enumerate()
        {
            if left.len() != right.len() {
                return Err(JoinError::logical(format!(
                    "disjunct {d} has {} left keys and {} right keys",
                    left.len(),
                    right.len()
                )));
            }
        }

        let right_sample = match &dictionary {
            Some(reader) => reader.sample(),
            None => right_sample,
        };

        if dictionary.is_some() {
            let supported = desc.kind == JoinKind::Left
                && matches!(
                    desc.strictness,
                    JoinStrictness::Any | JoinStrictness::Semi | JoinStrictness::Anti
                );
            if !supported {
                return Err(JoinError::IncompatibleJoin(
                    "join over dictionary supports only LEFT ANY, SEMI, and ANTI".to_string(),
                ));
            }
            if desc.disjunct_count() != 1 {
                return Err(JoinError::not_implemented(
                    "join over dictionary with several disjuncts",
                ));
            }
        }

        let is_asof = desc.strictness == JoinStrictness::Asof;
        if is_asof {
            if !matches!(desc.kind, JoinKind::Left | JoinKind::Inner) {
                return Err(JoinError::not_implemented(
                    "wrong ASOF JOIN type; only ASOF and LEFT ASOF joins are supported",
                ));
            }
            if desc.disjunct_count() != 1 {
                return Err(JoinError::not_implemented("ASOF join with several disjuncts"));
            }
            if desc.key_names_right[0].len() < 2 {
                return Err(JoinError::Syntax(
                    "ASOF join needs at least one equi-join column".to_string(),
                ));
            }
        }

        // Resolve and type-check the key columns on both sides.
        let mut right_key_types = Vec::with_capacity(desc.disjunct_count());
        for (d, names) in desc.key_names_right.iter().enumerate() {
            let mut types = Vec::with_capacity(names.len());
            for name in names {
                let field = right_sample
                    .field_with_name(name)
                    .map_err(|_| JoinError::NoSuchColumn(name.clone()))?;
                types.push(field.data_type().clone());
            }
            for (j, left_name) in desc.key_names_left[d].iter().enumerate() {
                let field = left_sample
                    .field_with_name(left_name)
                    .map_err(|_| JoinError::NoSuchColumn(left_name.clone()))?;
                if field.data_type() != &types[j] {
                    return Err(JoinError::TypeMismatch(format!(
                        "key {j} of disjunct {d}: left {left_name} is {}, right {} is {}",
                        field.data_type(),
                        desc.key_names_right[d][j],
                        types[j]
                    )));
                }
            }
            right_key_types.push(types);
        }

        let mut asof_type = None;
        if is_asof {
            let asof_name = desc.key_names_right[0].last().expect("checked above");
            let field = right_sample
                .field_with_name(asof_name)
                .map_err(|_| JoinError::NoSuchColumn(asof_name.clone()))?;
            if field.is_nullable() {
                return Err(JoinError::not_implemented(
                    "ASOF join over right table Nullable column",
                ));
            }
            asof_type = Some(asof_key_type(field.data_type()).ok_or_else(|| {
                JoinError::not_implemented(format!(
                    "ASOF join over key of type {}",
                    field.data_type()
                ))
            })?);
        }

        // Pick the hash variant from the first disjunct; a later disjunct
        // with a different choice forces the serialized fallback.
        let mut variant = JoinKeyVariant::Empty;
        let mut layouts: Vec<KeyLayout> = Vec::with_capacity(desc.disjunct_count());
        if desc.kind == JoinKind::Cross {
            variant = JoinKeyVariant::Cross;
        } else if dictionary.is_some() {
            variant = JoinKeyVariant::Dict;
        } else {
            for types in &right_key_types {
                let table_types = if is_asof {
                    &types[..types.len() - 1]
                } else {
                    &types[..]
                };
                let (current, layout) = choose_key_variant(table_types);
                layouts.push(layout);
                if variant == JoinKeyVariant::Empty {
                    variant = current;
                } else if variant != current {
                    variant = JoinKeyVariant::Hashed;
                }
            }
        }
        if variant == JoinKeyVariant::Hashed {
            // Promotion invalidates the per-disjunct packed layouts.
            layouts = vec![KeyLayout::default(); desc.disjunct_count()];
        }

        // Output columns: right columns whose name the left side does not
        // already carry. Right keys among them are reconstructed from the
        // left sources instead of gathered; the ASOF key is always gathered.
        let left_names: HashSet<&str> =
            left_sample.fields().iter().map(|f| f.name().as_str()).collect();
        let all_right_key_names: HashSet<&str> = desc
            .key_names_right
            .iter()
            .flat_map(|names| names.iter().map(|n| n.as_str()))
            .collect();
        let asof_right_name = if is_asof {
            desc.key_names_right[0].last().map(|s| s.as_str())
        } else {
            None
        };

        let mut added_fields: Vec<FieldRef> = Vec::new();
        let mut required_right_keys: Vec<(FieldRef, String)> = Vec::new();
        for field in right_sample.fields() {
            let name = field.name().as_str();
            if Some(name) == asof_right_name {
                added_fields.push(field.clone());
                continue;
            }
            if all_right_key_names.contains(name) {
                if !left_names.contains(name) {
                    let left_source = left_source_for(&desc, name).ok_or_else(|| {
                        JoinError::logical(format!("no left source for right key {name}"))
                    })?;
                    required_right_keys.push((field.clone(), left_source));
                }
            } else if !left_names.contains(name) {
                added_fields.push(field.clone());
            }
        }

        let saved_fields: Vec<FieldRef> = right_sample
            .fields()
            .iter()
            .filter(|field| {
                let name = field.name().as_str();
                all_right_key_names.contains(name)
                    || added_fields.iter().any(|f| f.name() == field.name())
            })
            .cloned()
            .collect();
        let saved_sample: SchemaRef = Arc::new(Schema::new(saved_fields));

        let shape = mapped_shape(desc.kind, desc.strictness);
        let mut tables = Vec::new();
        if !matches!(
            variant,
            JoinKeyVariant::Empty | JoinKeyVariant::Cross | JoinKeyVariant::Dict
        ) {
            for (types, layout) in right_key_types.iter().zip(layouts.into_iter()) {
                let table_types = if is_asof {
                    &types[..types.len() - 1]
                } else {
                    &types[..]
                };
                tables.push(JoinHashTable::new(
                    variant, layout, table_types, shape, asof_type,
                )?);
            }
        }

        let features = JoinFeatures::new(desc.kind, desc.strictness);
        let scope = if desc.disjunct_count() > 1 {
            FlagScope::PerRow
        } else {
            FlagScope::PerCell
        };

        debug!(
            "hash join created: kind {:?}, strictness {:?}, variant {:?}, {} disjuncts",
            desc.kind,
            desc.strictness,
            variant,
            desc.disjunct_count()
        );

        Ok(Self {
            desc,
            variant,
            left_sample,
            right_sample,
            saved_sample,
            added_fields,
            required_right_keys,
            right_key_types,
            data: Arc::new(BuildData::new(tables)),
            used_flags: Arc::new(UsedFlags::new(scope, features.need_flags)),
            dictionary,
            probe_started: AtomicBool::new(false),
            mem_tracker: MemTracker::new_root("HashJoin"),
            accounted_bytes: 0,
        })
    }

    pub fn left_sample(&self) -> &SchemaRef {
        &self.left_sample
    }

    pub fn right_sample(&self) -> &SchemaRef {
        &self.right_sample
    }

    /// Layout of the pinned build chunks.
    pub fn saved_sample(&self) -> &SchemaRef {
        &self.saved_sample
    }

    pub fn variant_name(&self) -> &'static str {
        match self.variant {
            JoinKeyVariant::Empty => "empty",
            JoinKeyVariant::Cross => "cross",
            JoinKeyVariant::Dict => "dict",
            JoinKeyVariant::Key8 => "key8",
            JoinKeyVariant::Key16 => "key16",
            JoinKeyVariant::Key32 => "key32",
            JoinKeyVariant::Key64 => "key64",
            JoinKeyVariant::Keys128 => "keys128",
            JoinKeyVariant::Keys256 => "keys256",
            JoinKeyVariant::KeyString => "key_string",
            JoinKeyVariant::KeyFixedString => "key_fixed_string",
            JoinKeyVariant::Hashed => "hashed",
        }
    }

    pub fn total_rows(&self) -> usize {
        self.data.rows
    }

    pub fn total_bytes(&self) -> usize {
        self.data.allocated_bytes()
    }

    pub fn empty(&self) -> bool {
        self.data.rows == 0
    }

    pub fn over_dictionary(&self) -> bool {
        self.dictionary.is_some()
    }

    /// INNER and RIGHT joins over an empty build side produce no rows no
    /// matter what is probed.
    pub fn always_returns_empty_set(&self) -> bool {
        self.desc.kind.is_inner_or_right() && self.empty() && !self.over_dictionary()
    }

    pub fn mem_tracker(&self) -> &Arc<MemTracker> {
        &self.mem_tracker
    }

    /// Ingest one build-side chunk. With `check_limits`, the configured size
    /// limits are re-evaluated and `Ok(false)` reports a Break-mode refusal.
    pub fn add_build_chunk(&mut self, chunk: &Chunk, check_limits: bool) -> Result<bool> {
        if self.variant == JoinKeyVariant::Empty {
            return Err(JoinError::logical("hash join was not initialized"));
        }
        if self.over_dictionary() {
            return Err(JoinError::logical(
                "insert into hash-map in a join over dictionary",
            ));
        }
        if self.probe_started.load(Ordering::Acquire) {
            return Err(JoinError::logical(
                "build chunk added while the join is locked by probing",
            ));
        }
        if chunk.len() > u32::MAX as usize {
            return Err(JoinError::not_implemented(format!(
                "too many rows in right table chunk for hash join: {}",
                chunk.len()
            )));
        }

        // Resolve everything fallible before pinning anything.
        let mut structured_columns = Vec::with_capacity(self.saved_sample.fields().len());
        for field in self.saved_sample.fields() {
            let column = chunk.column_by_name(field.name())?;
            if column.data_type() != field.data_type() {
                return Err(JoinError::TypeMismatch(format!(
                    "build column {} is {}, expected {}",
                    field.name(),
                    column.data_type(),
                    field.data_type()
                )));
            }
            structured_columns.push(column);
        }
        let structured = Chunk::new(RecordBatch::try_new_with_options(
            self.saved_sample.clone(),
            structured_columns,
            &arrow::array::RecordBatchOptions::new().with_row_count(Some(chunk.len())),
        )?);

        let mut disjunct_keys: Vec<Vec<ArrayRef>> = Vec::with_capacity(self.desc.disjunct_count());
        for names in &self.desc.key_names_right {
            let mut arrays = Vec::with_capacity(names.len());
            for name in names {
                arrays.push(chunk.column_by_name(name)?);
            }
            disjunct_keys.push(arrays);
        }

        let is_asof = self.desc.strictness == JoinStrictness::Asof;
        let save_null_rows = self.desc.kind.is_right_or_full();
        let any_take_last_row = self.desc.any_take_last_row;

        let data = Arc::get_mut(&mut self.data).ok_or_else(|| {
            JoinError::logical("build chunk added to a join with shared build data")
        })?;
        data.add_chunk(
            structured,
            &disjunct_keys,
            is_asof,
            save_null_rows,
            any_take_last_row,
        )?;

        // Number of cells + 1 covers the zero-key slot; per-row scope sizes
        // by the global row count instead.
        let flag_size = match self.used_flags.scope() {
            FlagScope::PerCell => data.tables.first().map(|t| t.cell_count() + 1).unwrap_or(0),
            FlagScope::PerRow => data.rows,
        };
        let flags = Arc::get_mut(&mut self.used_flags)
            .ok_or_else(|| JoinError::logical("used flags shared during build"))?;
        flags.reinit(flag_size);

        let bytes = self.data.allocated_bytes() as i64;
        let delta = bytes - self.accounted_bytes;
        if delta > 0 {
            self.mem_tracker.consume(delta);
        } else {
            self.mem_tracker.release(-delta);
        }
        self.accounted_bytes = bytes;

        if !check_limits {
            return Ok(true);
        }
        self.desc
            .size_limits
            .check(self.total_rows(), self.total_bytes())
    }

    /// Probe one chunk: extends it with the right-side columns, filtering or
    /// replicating the probe columns per kind/strictness. Cross joins may
    /// suspend into `not_processed`; pass the continuation back in to
    /// resume.
    pub fn join_chunk(
        &self,
        chunk: &Chunk,
        not_processed: &mut Option<CrossJoinResume>,
    ) -> Result<Chunk> {
        self.probe_started.store(true, Ordering::Release);
        match self.variant {
            JoinKeyVariant::Empty => Err(JoinError::logical("probing an uninitialized join")),
            JoinKeyVariant::Cross => cross_join_chunk(self, chunk, not_processed),
            JoinKeyVariant::Dict => probe_dict_chunk(
                self,
                chunk,
                &self.desc.key_names_left,
                &self.added_fields,
                &self.required_right_keys,
            ),
            _ => probe_chunk(
                self,
                chunk,
                &self.desc.key_names_left,
                &self.added_fields,
                &self.required_right_keys,
            ),
        }
    }

    /// Stream of build rows no probe matched, for RIGHT and FULL kinds.
    /// Returns `None` when the kind/strictness pair never emits them.
    pub fn non_joined_chunks(&self, max_chunk_size: usize) -> Option<NonJoinedStream> {
        if !self.desc.kind.is_right_or_full() {
            return None;
        }
        if matches!(
            self.desc.strictness,
            JoinStrictness::Asof | JoinStrictness::Semi
        ) {
            return None;
        }
        let features = JoinFeatures::new(self.desc.kind, self.desc.strictness);
        let left_fields = self
            .left_sample
            .fields()
            .iter()
            .map(|field| nullable_field(field))
            .collect::<Vec<_>>();
        let added_nullable = features.add_missing || self.desc.force_nullable_right;
        let added_fields = self
            .added_fields
            .iter()
            .map(|field| {
                if added_nullable {
                    nullable_field(field)
                } else {
                    field.clone()
                }
            })
            .collect::<Vec<_>>();
        let right_key_fields = self
            .required_right_keys
            .iter()
            .map(|(field, _)| {
                if added_nullable || !features.need_filter {
                    nullable_field(field)
                } else {
                    field.clone()
                }
            })
            .collect::<Vec<_>>();
        Some(NonJoinedStream::new(
            Arc::clone(&self.data),
            Arc::clone(&self.used_flags),
            left_fields,
            added_fields,
            right_key_fields,
            max_chunk_size,
        ))
    }

    /// Validate a `join_get` call and return the output field. `or_null`
    /// forces a nullable return type.
    pub fn join_get_return_field(
        &self,
        key_types: &[DataType],
        column_name: &str,
        or_null: bool,
    ) -> Result<FieldRef> {
        let expected = self
            .right_key_types
            .first()
            .ok_or_else(|| JoinError::logical("joinGet against a join without key columns"))?;
        if key_types.len() != expected.len() {
            return Err(JoinError::ArgumentCountMismatch(format!(
                "joinGet passed {} keys, needs {}",
                key_types.len(),
                expected.len()
            )));
        }
        for (index, (left, right)) in key_types.iter().zip(expected.iter()).enumerate() {
            if left != right {
                return Err(JoinError::TypeMismatch(format!(
                    "joinGet key {index}: found type {left}, while the needed type is {right}"
                )));
            }
        }
        let field = self
            .added_fields
            .iter()
            .find(|field| field.name() == column_name)
            .ok_or_else(|| JoinError::NoSuchColumn(column_name.to_string()))?;
        if or_null {
            Ok(nullable_field(field))
        } else {
            Ok(field.clone())
        }
    }

    /// Point lookup: resolve `column_name` for each key tuple. Misses (and
    /// NULL keys) yield NULL. Only LEFT ANY-style joins support this.
    pub fn join_get(&self, keys: &[ArrayRef], column_name: &str) -> Result<ArrayRef> {
        let valid = self.desc.kind == JoinKind::Left
            && matches!(
                self.desc.strictness,
                JoinStrictness::Any | JoinStrictness::RightAny
            );
        if !valid {
            return Err(JoinError::IncompatibleJoin(
                "joinGet only supports joins of type LEFT ANY".to_string(),
            ));
        }
        if self.over_dictionary() {
            return Err(JoinError::not_implemented("joinGet over a dictionary join"));
        }
        let key_types = keys
            .iter()
            .map(|array| array.data_type().clone())
            .collect::<Vec<_>>();
        let target = self.join_get_return_field(&key_types, column_name, false)?;

        // Assemble the key chunk under the right-side key names and run the
        // regular probe against disjunct 0, asking for the one target column.
        let names = &self.desc.key_names_right[0];
        let fields = names
            .iter()
            .zip(keys.iter())
            .map(|(name, array)| {
                Arc::new(Field::new(name, array.data_type().clone(), true)) as FieldRef
            })
            .collect::<Vec<_>>();
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), keys.to_vec())?;
        let key_chunk = Chunk::new(batch);

        self.probe_started.store(true, Ordering::Release);
        let key_names = std::slice::from_ref(&self.desc.key_names_right[0]);
        let joined = probe_chunk(
            self,
            &key_chunk,
            key_names,
            std::slice::from_ref(&target),
            &[],
        )?;
        joined.column_by_name(column_name)
    }

    /// Share a finished build side from another join of the same shape. The
    /// recipient gets fresh used-flags sized to the donor's tables.
    pub fn reuse_joined_data(&mut self, donor: &HashJoin) -> Result<()> {
        if self.desc.kind != donor.desc.kind || self.desc.strictness != donor.desc.strictness {
            return Err(JoinError::IncompatibleJoin(format!(
                "cannot reuse {:?} {:?} build data for a {:?} {:?} join",
                donor.desc.kind, donor.desc.strictness, self.desc.kind, self.desc.strictness
            )));
        }
        if self.variant != donor.variant {
            return Err(JoinError::IncompatibleJoin(
                "cannot reuse build data across join key variants".to_string(),
            ));
        }
        self.data = Arc::clone(&donor.data);
        let features = JoinFeatures::new(self.desc.kind, self.desc.strictness);
        let scope = donor.used_flags.scope();
        let mut flags = UsedFlags::new(scope, features.need_flags);
        let size = match scope {
            FlagScope::PerCell => self
                .data
                .tables
                .first()
                .map(|t| t.cell_count() + 1)
                .unwrap_or(0),
            FlagScope::PerRow => self.data.rows,
        };
        flags.reinit(size);
        self.used_flags = Arc::new(flags);
        self.probe_started.store(false, Ordering::Release);
        Ok(())
    }
}

fn left_source_for(desc: &JoinDesc, right_name: &str) -> Option<String> {
    for (left_names, right_names) in desc.key_names_left.iter().zip(desc.key_names_right.iter()) {
        for (j, name) in right_names.iter().enumerate() {
            if name == right_name {
                return Some(left_names[j].clone());
            }
        }
    }
    None
}
