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
//! External key-value dictionary as the join's build side.
//!
//! Responsibilities:
//! - Defines the bulk-lookup contract a dictionary must implement to stand
//!   in for a materialized build side (LEFT ANY/SEMI/ANTI only).

use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;

use crate::common::error::Result;
use crate::exec::chunk::Chunk;

/// Result of one bulk dictionary lookup over a probe chunk's key columns.
#[derive(Debug)]
pub struct DictLookup {
    /// Dictionary rows in the reader's sample layout; `positions` index it.
    pub chunk: Chunk,
    /// Per probe row: whether the key exists in the dictionary.
    pub found: Vec<bool>,
    /// Per probe row: row offset into `chunk`; meaningful where `found`.
    pub positions: Vec<u32>,
}

/// Read access to an external dictionary used instead of a hash table.
///
/// The engine calls `read_keys` once per probe chunk and serves every row of
/// that chunk from the returned result, so implementations should batch
/// their backing lookups rather than optimize the per-row path.
pub trait DictionaryReader: Send + Sync {
    /// Schema of the dictionary's attribute columns, keyed columns included.
    fn sample(&self) -> SchemaRef;

    /// Bulk-resolve the given key columns, one entry per probe row.
    fn read_keys(&self, keys: &[ArrayRef]) -> Result<DictLookup>;
}
