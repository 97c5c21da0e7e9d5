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
use std::collections::HashSet;

use arrow::array::{Array, ArrayRef, RecordBatch};
use arrow::buffer::Buffer;
use arrow::datatypes::SchemaRef;

use crate::common::error::{JoinError, Result};

/// A chunk of data, consisting of multiple rows.
/// Wrapper around Arrow RecordBatch; columns are addressed by field name.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub batch: RecordBatch,
}

impl Chunk {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.batch.columns()
    }

    pub fn column_by_name(&self, name: &str) -> Result<ArrayRef> {
        self.batch
            .column_by_name(name)
            .cloned()
            .ok_or_else(|| JoinError::NoSuchColumn(name.to_string()))
    }

    pub fn slice(&self, offset: usize, length: usize) -> Self {
        Self {
            batch: self.batch.slice(offset, length),
        }
    }

    pub fn estimated_bytes(&self) -> usize {
        record_batch_bytes(&self.batch)
    }
}

/// Estimate RecordBatch size by summing unique buffers inside the batch.
///
/// NOTE: buffers are de-duplicated only within a single RecordBatch. Shared
/// buffers across batches (e.g. slices/dictionaries) will be double-counted.
pub fn record_batch_bytes(batch: &RecordBatch) -> usize {
    let mut seen = HashSet::new();
    let mut total = 0usize;
    for column in batch.columns() {
        total = total.saturating_add(array_data_bytes(&column.to_data(), &mut seen));
    }
    total
}

fn array_data_bytes(data: &arrow::array::ArrayData, seen: &mut HashSet<usize>) -> usize {
    let mut total = 0usize;
    for buffer in data.buffers() {
        total = total.saturating_add(buffer_bytes(buffer, seen));
    }
    if let Some(nulls) = data.nulls() {
        total = total.saturating_add(buffer_bytes(nulls.buffer(), seen));
    }
    for child in data.child_data() {
        total = total.saturating_add(array_data_bytes(child, seen));
    }
    total
}

fn buffer_bytes(buffer: &Buffer, seen: &mut HashSet<usize>) -> usize {
    let ptr = buffer.data_ptr().as_ptr() as usize;
    if !seen.insert(ptr) {
        return 0;
    }
    buffer.capacity().max(buffer.len())
}
