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
//! Cross join: memory-bounded nested loop with a resumable continuation.
//!
//! Responsibilities:
//! - Emits the cartesian product of each probe row with every build chunk.
//! - Caps output size per invocation and hands the caller a continuation
//!   carrying the probe chunk and the resume position.

use arrow::array::{RecordBatch, UInt32Array};
use tracing::trace;

use crate::common::error::Result;
use crate::exec::chunk::Chunk;
use crate::exec::join::hash_join::HashJoin;
use crate::exec::join::output::{schema_from_fields, take_columns};

/// Continuation of a cross join that hit `max_joined_block_rows`. Feed it
/// back through `join_chunk` to produce the remaining output.
#[derive(Debug)]
pub struct CrossJoinResume {
    pub(crate) chunk: Chunk,
    pub(crate) left_position: usize,
    pub(crate) right_chunk_index: usize,
}

pub(crate) fn cross_join_chunk(
    join: &HashJoin,
    chunk: &Chunk,
    not_processed: &mut Option<CrossJoinResume>,
) -> Result<Chunk> {
    let (probe, start_left, start_right) = match not_processed.take() {
        Some(resume) => (
            resume.chunk,
            resume.left_position,
            resume.right_chunk_index,
        ),
        None => (chunk.clone(), 0, 0),
    };

    let max_rows = join.desc.max_joined_block_rows;
    let mut fields = probe.schema().fields().to_vec();
    for field in &join.added_fields {
        fields.push(field.clone());
    }
    let schema = schema_from_fields(fields);

    let mut segments: Vec<RecordBatch> = Vec::new();
    let mut rows_added = 0usize;

    'outer: for left_row in start_left..probe.len() {
        let right_start = if left_row == start_left {
            start_right
        } else {
            0
        };
        for chunk_index in right_start..join.data.chunks.len() {
            let build = &join.data.chunks[chunk_index];
            let build_rows = build.len();
            if build_rows == 0 {
                continue;
            }

            let repeat = UInt32Array::from(vec![left_row as u32; build_rows]);
            let mut columns = take_columns(probe.columns(), &repeat)?;
            for field in &join.added_fields {
                columns.push(build.column_by_name(field.name())?);
            }
            segments.push(RecordBatch::try_new(schema.clone(), columns)?);
            rows_added += build_rows;

            if max_rows > 0 && rows_added > max_rows {
                trace!(
                    "cross join: {} rows exceed cap {}, suspending at left row {}",
                    rows_added,
                    max_rows,
                    left_row
                );
                *not_processed = Some(CrossJoinResume {
                    chunk: probe,
                    left_position: left_row,
                    right_chunk_index: chunk_index + 1,
                });
                break 'outer;
            }
        }
    }

    let batch = if segments.is_empty() {
        RecordBatch::new_empty(schema)
    } else if segments.len() == 1 {
        segments.remove(0)
    } else {
        arrow::compute::concat_batches(&schema, &segments)?
    };
    Ok(Chunk::new(batch))
}
