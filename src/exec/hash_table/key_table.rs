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
use std::mem;

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;
use arrow::row::{RowConverter, SortField};
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::raw::RawTable;

use crate::common::error::{JoinError, Result};
use crate::exec::hash_table::hash::{
    hash_bytes_with_seed, hash_u64_with_seed, hash_u128_with_seed, seed_from_hasher,
};
use crate::exec::hash_table::key_packer::{KeyArrayView, build_key_views, pack_fixed_row};
use crate::exec::hash_table::key_storage::{RowKey, RowStorage};
use crate::exec::hash_table::key_variant::{JoinKeyVariant, KeyLayout};

#[derive(Clone, Copy, Debug)]
struct KeyEntry<K> {
    key: K,
    hash: u64,
    cell: u32,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct KeyLookup {
    pub(crate) cell: u32,
    pub(crate) is_new: bool,
}

pub(crate) trait FixedKey: Copy + Eq {
    fn hash_with_seed(self, seed: u64) -> u64;
}

impl FixedKey for u8 {
    fn hash_with_seed(self, seed: u64) -> u64 {
        hash_u64_with_seed(seed, self as u64)
    }
}

impl FixedKey for u16 {
    fn hash_with_seed(self, seed: u64) -> u64 {
        hash_u64_with_seed(seed, self as u64)
    }
}

impl FixedKey for u32 {
    fn hash_with_seed(self, seed: u64) -> u64 {
        hash_u64_with_seed(seed, self as u64)
    }
}

impl FixedKey for u64 {
    fn hash_with_seed(self, seed: u64) -> u64 {
        hash_u64_with_seed(seed, self)
    }
}

impl FixedKey for u128 {
    fn hash_with_seed(self, seed: u64) -> u64 {
        hash_u128_with_seed(seed, self)
    }
}

/// 32-byte packed key for the `Keys256` variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Key256(pub(crate) [u8; 32]);

impl FixedKey for Key256 {
    fn hash_with_seed(self, seed: u64) -> u64 {
        hash_bytes_with_seed(seed, &self.0)
    }
}

struct FixedKeyTable<K: FixedKey> {
    table: RawTable<KeyEntry<K>>,
}

impl<K: FixedKey> FixedKeyTable<K> {
    fn new() -> Self {
        Self {
            table: RawTable::new(),
        }
    }

    fn find(&self, key: K, seed: u64) -> Option<u32> {
        let hash = key.hash_with_seed(seed);
        self.table.get(hash, |e| e.key == key).map(|e| e.cell)
    }

    fn find_or_insert(&mut self, key: K, seed: u64, next_cell: u32) -> KeyLookup {
        let hash = key.hash_with_seed(seed);
        if let Some(entry) = self.table.get(hash, |e| e.key == key) {
            return KeyLookup {
                cell: entry.cell,
                is_new: false,
            };
        }
        self.table.insert(
            hash,
            KeyEntry {
                key,
                hash,
                cell: next_cell,
            },
            |e| e.hash,
        );
        KeyLookup {
            cell: next_cell,
            is_new: true,
        }
    }

    fn allocated_bytes(&self) -> usize {
        self.table.capacity() * mem::size_of::<KeyEntry<K>>()
    }
}

struct BytesKeyTable {
    table: RawTable<KeyEntry<RowKey>>,
    storage: RowStorage,
}

impl BytesKeyTable {
    fn new() -> Self {
        Self {
            table: RawTable::new(),
            storage: RowStorage::new(64 * 1024),
        }
    }

    fn find(&self, bytes: &[u8], seed: u64) -> Option<u32> {
        let hash = hash_bytes_with_seed(seed, bytes);
        self.table
            .get(hash, |e| e.key.as_slice() == bytes)
            .map(|e| e.cell)
    }

    fn find_or_insert(&mut self, bytes: &[u8], seed: u64, next_cell: u32) -> KeyLookup {
        let hash = hash_bytes_with_seed(seed, bytes);
        if let Some(entry) = self.table.get(hash, |e| e.key.as_slice() == bytes) {
            return KeyLookup {
                cell: entry.cell,
                is_new: false,
            };
        }
        let key = if bytes.is_empty() {
            RowKey::empty()
        } else {
            self.storage.alloc_copy(bytes)
        };
        self.table.insert(
            hash,
            KeyEntry {
                key,
                hash,
                cell: next_cell,
            },
            |e| e.hash,
        );
        KeyLookup {
            cell: next_cell,
            is_new: true,
        }
    }

    fn allocated_bytes(&self) -> usize {
        self.table.capacity() * mem::size_of::<KeyEntry<RowKey>>()
            + self.storage.allocated_bytes()
    }
}

enum VariantTable {
    Key8(FixedKeyTable<u8>),
    Key16(FixedKeyTable<u16>),
    Key32(FixedKeyTable<u32>),
    Key64(FixedKeyTable<u64>),
    Keys128(FixedKeyTable<u128>),
    Keys256(FixedKeyTable<Key256>),
    KeyString(BytesKeyTable),
    KeyFixedString(BytesKeyTable),
    Hashed(BytesKeyTable),
}

/// Maps packed join keys of one disjunct to dense cell ids.
///
/// Cell ids are assigned in first-insertion order; the join layer hangs its
/// row chains, single refs, and ASOF series off those ids.
pub(crate) struct KeyTable {
    variant: JoinKeyVariant,
    layout: KeyLayout,
    table: VariantTable,
    row_converter: Option<RowConverter>,
    hash_seed: u64,
    cell_count: u32,
}

impl KeyTable {
    pub(crate) fn new(
        variant: JoinKeyVariant,
        layout: KeyLayout,
        key_types: &[DataType],
    ) -> Result<Self> {
        let table = match variant {
            JoinKeyVariant::Key8 => VariantTable::Key8(FixedKeyTable::new()),
            JoinKeyVariant::Key16 => VariantTable::Key16(FixedKeyTable::new()),
            JoinKeyVariant::Key32 => VariantTable::Key32(FixedKeyTable::new()),
            JoinKeyVariant::Key64 => VariantTable::Key64(FixedKeyTable::new()),
            JoinKeyVariant::Keys128 => VariantTable::Keys128(FixedKeyTable::new()),
            JoinKeyVariant::Keys256 => VariantTable::Keys256(FixedKeyTable::new()),
            JoinKeyVariant::KeyString => VariantTable::KeyString(BytesKeyTable::new()),
            JoinKeyVariant::KeyFixedString => VariantTable::KeyFixedString(BytesKeyTable::new()),
            JoinKeyVariant::Hashed => VariantTable::Hashed(BytesKeyTable::new()),
            JoinKeyVariant::Empty | JoinKeyVariant::Cross | JoinKeyVariant::Dict => {
                return Err(JoinError::logical(format!(
                    "key table cannot be built for join variant {variant:?}"
                )));
            }
        };
        let row_converter = if matches!(variant, JoinKeyVariant::Hashed) {
            let fields = key_types
                .iter()
                .cloned()
                .map(SortField::new)
                .collect::<Vec<_>>();
            match RowConverter::new(fields) {
                Ok(converter) => Some(converter),
                Err(e) => {
                    return Err(JoinError::UnsupportedJoinKeys(format!(
                        "key tuple has no row encoding: {e}"
                    )));
                }
            }
        } else {
            None
        };
        Ok(Self {
            variant,
            layout,
            table,
            row_converter,
            hash_seed: seed_from_hasher(&DefaultHashBuilder::default()),
            cell_count: 0,
        })
    }

    pub(crate) fn variant(&self) -> JoinKeyVariant {
        self.variant
    }

    pub(crate) fn cell_count(&self) -> usize {
        self.cell_count as usize
    }

    /// Insert the non-skipped rows of one key-column set. The callback sees
    /// `(row, lookup)` for every inserted row in row order.
    pub(crate) fn insert_keys(
        &mut self,
        arrays: &[ArrayRef],
        skip: Option<&[bool]>,
        rows: usize,
        mut on_row: impl FnMut(usize, KeyLookup),
    ) -> Result<()> {
        let seed = self.hash_seed;
        let skipped = |row: usize| skip.map(|m| m[row]).unwrap_or(false);

        if let VariantTable::Hashed(table) = &mut self.table {
            let converter = self
                .row_converter
                .as_ref()
                .ok_or_else(|| JoinError::logical("row converter missing for hashed join keys"))?;
            let encoded = converter.convert_columns(arrays)?;
            for row in 0..rows {
                if skipped(row) {
                    continue;
                }
                let lookup = table.find_or_insert(encoded.row(row).data(), seed, self.cell_count);
                if lookup.is_new {
                    self.cell_count += 1;
                }
                on_row(row, lookup);
            }
            return Ok(());
        }

        let views = build_key_views(arrays)?;
        match &mut self.table {
            VariantTable::Key8(table) => {
                let mut buf = [0u8; 32];
                for row in 0..rows {
                    if skipped(row) {
                        continue;
                    }
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let lookup = table.find_or_insert(buf[0], seed, self.cell_count);
                    if lookup.is_new {
                        self.cell_count += 1;
                    }
                    on_row(row, lookup);
                }
            }
            VariantTable::Key16(table) => {
                let mut buf = [0u8; 32];
                for row in 0..rows {
                    if skipped(row) {
                        continue;
                    }
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let key = u16::from_le_bytes(buf[0..2].try_into().expect("key16 bytes"));
                    let lookup = table.find_or_insert(key, seed, self.cell_count);
                    if lookup.is_new {
                        self.cell_count += 1;
                    }
                    on_row(row, lookup);
                }
            }
            VariantTable::Key32(table) => {
                let mut buf = [0u8; 32];
                for row in 0..rows {
                    if skipped(row) {
                        continue;
                    }
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let key = u32::from_le_bytes(buf[0..4].try_into().expect("key32 bytes"));
                    let lookup = table.find_or_insert(key, seed, self.cell_count);
                    if lookup.is_new {
                        self.cell_count += 1;
                    }
                    on_row(row, lookup);
                }
            }
            VariantTable::Key64(table) => {
                let mut buf = [0u8; 32];
                for row in 0..rows {
                    if skipped(row) {
                        continue;
                    }
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let key = u64::from_le_bytes(buf[0..8].try_into().expect("key64 bytes"));
                    let lookup = table.find_or_insert(key, seed, self.cell_count);
                    if lookup.is_new {
                        self.cell_count += 1;
                    }
                    on_row(row, lookup);
                }
            }
            VariantTable::Keys128(table) => {
                let mut buf;
                for row in 0..rows {
                    if skipped(row) {
                        continue;
                    }
                    buf = [0u8; 32];
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let key = u128::from_le_bytes(buf[0..16].try_into().expect("keys128 bytes"));
                    let lookup = table.find_or_insert(key, seed, self.cell_count);
                    if lookup.is_new {
                        self.cell_count += 1;
                    }
                    on_row(row, lookup);
                }
            }
            VariantTable::Keys256(table) => {
                let mut buf;
                for row in 0..rows {
                    if skipped(row) {
                        continue;
                    }
                    buf = [0u8; 32];
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let lookup = table.find_or_insert(Key256(buf), seed, self.cell_count);
                    if lookup.is_new {
                        self.cell_count += 1;
                    }
                    on_row(row, lookup);
                }
            }
            VariantTable::KeyString(table) => {
                let KeyArrayView::Utf8(arr) = &views[0] else {
                    return Err(JoinError::logical("single string join key expects Utf8"));
                };
                for row in 0..rows {
                    if skipped(row) {
                        continue;
                    }
                    let lookup =
                        table.find_or_insert(arr.value(row).as_bytes(), seed, self.cell_count);
                    if lookup.is_new {
                        self.cell_count += 1;
                    }
                    on_row(row, lookup);
                }
            }
            VariantTable::KeyFixedString(table) => {
                let KeyArrayView::FixedSizeBinary(arr) = &views[0] else {
                    return Err(JoinError::logical(
                        "fixed string join key expects FixedSizeBinary",
                    ));
                };
                for row in 0..rows {
                    if skipped(row) {
                        continue;
                    }
                    let lookup = table.find_or_insert(arr.value(row), seed, self.cell_count);
                    if lookup.is_new {
                        self.cell_count += 1;
                    }
                    on_row(row, lookup);
                }
            }
            VariantTable::Hashed(_) => unreachable!("hashed keys handled above"),
        }
        Ok(())
    }

    /// Look up the cell id of every non-skipped probe row; `None` means no
    /// build row carries that key (or the row was skipped).
    pub(crate) fn lookup_keys(
        &self,
        arrays: &[ArrayRef],
        skip: Option<&[bool]>,
        rows: usize,
    ) -> Result<Vec<Option<u32>>> {
        let seed = self.hash_seed;
        let skipped = |row: usize| skip.map(|m| m[row]).unwrap_or(false);
        let mut cells = vec![None; rows];

        if let VariantTable::Hashed(table) = &self.table {
            let converter = self
                .row_converter
                .as_ref()
                .ok_or_else(|| JoinError::logical("row converter missing for hashed join keys"))?;
            let encoded = converter.convert_columns(arrays)?;
            for (row, cell) in cells.iter_mut().enumerate() {
                if skipped(row) {
                    continue;
                }
                *cell = table.find(encoded.row(row).data(), seed);
            }
            return Ok(cells);
        }

        let views = build_key_views(arrays)?;
        match &self.table {
            VariantTable::Key8(table) => {
                let mut buf = [0u8; 32];
                for (row, cell) in cells.iter_mut().enumerate() {
                    if skipped(row) {
                        continue;
                    }
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    *cell = table.find(buf[0], seed);
                }
            }
            VariantTable::Key16(table) => {
                let mut buf = [0u8; 32];
                for (row, cell) in cells.iter_mut().enumerate() {
                    if skipped(row) {
                        continue;
                    }
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let key = u16::from_le_bytes(buf[0..2].try_into().expect("key16 bytes"));
                    *cell = table.find(key, seed);
                }
            }
            VariantTable::Key32(table) => {
                let mut buf = [0u8; 32];
                for (row, cell) in cells.iter_mut().enumerate() {
                    if skipped(row) {
                        continue;
                    }
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let key = u32::from_le_bytes(buf[0..4].try_into().expect("key32 bytes"));
                    *cell = table.find(key, seed);
                }
            }
            VariantTable::Key64(table) => {
                let mut buf = [0u8; 32];
                for (row, cell) in cells.iter_mut().enumerate() {
                    if skipped(row) {
                        continue;
                    }
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let key = u64::from_le_bytes(buf[0..8].try_into().expect("key64 bytes"));
                    *cell = table.find(key, seed);
                }
            }
            VariantTable::Keys128(table) => {
                let mut buf;
                for (row, cell) in cells.iter_mut().enumerate() {
                    if skipped(row) {
                        continue;
                    }
                    buf = [0u8; 32];
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    let key = u128::from_le_bytes(buf[0..16].try_into().expect("keys128 bytes"));
                    *cell = table.find(key, seed);
                }
            }
            VariantTable::Keys256(table) => {
                let mut buf;
                for (row, cell) in cells.iter_mut().enumerate() {
                    if skipped(row) {
                        continue;
                    }
                    buf = [0u8; 32];
                    pack_fixed_row(&views, &self.layout, row, &mut buf)?;
                    *cell = table.find(Key256(buf), seed);
                }
            }
            VariantTable::KeyString(table) => {
                let KeyArrayView::Utf8(arr) = &views[0] else {
                    return Err(JoinError::logical("single string join key expects Utf8"));
                };
                for (row, cell) in cells.iter_mut().enumerate() {
                    if skipped(row) {
                        continue;
                    }
                    *cell = table.find(arr.value(row).as_bytes(), seed);
                }
            }
            VariantTable::KeyFixedString(table) => {
                let KeyArrayView::FixedSizeBinary(arr) = &views[0] else {
                    return Err(JoinError::logical(
                        "fixed string join key expects FixedSizeBinary",
                    ));
                };
                for (row, cell) in cells.iter_mut().enumerate() {
                    if skipped(row) {
                        continue;
                    }
                    *cell = table.find(arr.value(row), seed);
                }
            }
            VariantTable::Hashed(_) => unreachable!("hashed keys handled above"),
        }
        Ok(cells)
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        match &self.table {
            VariantTable::Key8(t) => t.allocated_bytes(),
            VariantTable::Key16(t) => t.allocated_bytes(),
            VariantTable::Key32(t) => t.allocated_bytes(),
            VariantTable::Key64(t) => t.allocated_bytes(),
            VariantTable::Keys128(t) => t.allocated_bytes(),
            VariantTable::Keys256(t) => t.allocated_bytes(),
            VariantTable::KeyString(t) => t.allocated_bytes(),
            VariantTable::KeyFixedString(t) => t.allocated_bytes(),
            VariantTable::Hashed(t) => t.allocated_bytes(),
        }
    }
}
