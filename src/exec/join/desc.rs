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
//! Join descriptor: kind, strictness, key sets, and derived probe features.

use crate::common::error::{JoinError, Result};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn is_right_or_full(self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }

    pub fn is_inner_or_right(self) -> bool {
        matches!(self, JoinKind::Inner | JoinKind::Right)
    }
}

/// How many build rows one probe row may produce.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinStrictness {
    /// At most one build row per probe row.
    Any,
    /// Every matching build row.
    All,
    /// Exact match on the leading keys, inequality on the trailing key.
    Asof,
    /// Membership only; emits the probe row once.
    Semi,
    /// Non-membership; emits probe rows without a match.
    Anti,
    /// Legacy ANY: deduplicates the build side at insertion time.
    RightAny,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AsofInequality {
    Less,
    LessOrEquals,
    Greater,
    GreaterOrEquals,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverflowMode {
    /// Exceeding the limit is an error.
    Throw,
    /// Exceeding the limit rejects further build input.
    Break,
}

/// Build-side size limits checked by `add_build_chunk`. Zero means unlimited.
#[derive(Copy, Clone, Debug)]
pub struct SizeLimits {
    pub max_rows: usize,
    pub max_bytes: usize,
    pub overflow_mode: OverflowMode,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_rows: 0,
            max_bytes: 0,
            overflow_mode: OverflowMode::Throw,
        }
    }
}

impl SizeLimits {
    /// Ok(true) while within limits; Break mode turns overflow into Ok(false).
    pub fn check(&self, rows: usize, bytes: usize) -> Result<bool> {
        let rows_over = self.max_rows > 0 && rows > self.max_rows;
        let bytes_over = self.max_bytes > 0 && bytes > self.max_bytes;
        if !rows_over && !bytes_over {
            return Ok(true);
        }
        match self.overflow_mode {
            OverflowMode::Break => Ok(false),
            OverflowMode::Throw => Err(JoinError::SizeLimitExceeded(format!(
                "rows {rows} (limit {}), bytes {bytes} (limit {})",
                self.max_rows, self.max_bytes
            ))),
        }
    }
}

/// Static description of one hash join, supplied at construction.
///
/// `key_names_left`/`key_names_right` hold one name list per disjunct; the
/// disjuncts are OR'ed and each pair of lists has equal length.
#[derive(Clone, Debug)]
pub struct JoinDesc {
    pub kind: JoinKind,
    pub strictness: JoinStrictness,
    pub key_names_left: Vec<Vec<String>>,
    pub key_names_right: Vec<Vec<String>>,
    pub force_nullable_left: bool,
    pub force_nullable_right: bool,
    pub asof_inequality: AsofInequality,
    /// Replace the stored row on duplicate keys under single-row strictness.
    pub any_take_last_row: bool,
    /// Output-row cap per cross-join invocation; zero means unbounded.
    pub max_joined_block_rows: usize,
    pub size_limits: SizeLimits,
}

impl JoinDesc {
    pub fn new(kind: JoinKind, strictness: JoinStrictness) -> Self {
        Self {
            kind,
            strictness,
            key_names_left: Vec::new(),
            key_names_right: Vec::new(),
            force_nullable_left: false,
            force_nullable_right: false,
            asof_inequality: AsofInequality::GreaterOrEquals,
            any_take_last_row: false,
            max_joined_block_rows: 0,
            size_limits: SizeLimits::default(),
        }
    }

    pub fn with_keys(
        mut self,
        key_names_left: Vec<Vec<String>>,
        key_names_right: Vec<Vec<String>>,
    ) -> Self {
        self.key_names_left = key_names_left;
        self.key_names_right = key_names_right;
        self
    }

    pub fn disjunct_count(&self) -> usize {
        self.key_names_right.len()
    }
}

/// Per-cell payload shape of the hash tables for one kind/strictness pair.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum MappedShape {
    /// One row per key.
    Single,
    /// Every inserted row, linked in insertion order.
    Chain,
    /// Ordered time series keyed by the trailing ASOF column.
    Asof,
}

pub(crate) fn mapped_shape(kind: JoinKind, strictness: JoinStrictness) -> MappedShape {
    match strictness {
        JoinStrictness::Asof => MappedShape::Asof,
        JoinStrictness::All => MappedShape::Chain,
        JoinStrictness::Any => match kind {
            JoinKind::Right => MappedShape::Chain,
            _ => MappedShape::Single,
        },
        JoinStrictness::Semi | JoinStrictness::Anti => match kind {
            JoinKind::Right => MappedShape::Chain,
            _ => MappedShape::Single,
        },
        JoinStrictness::RightAny => MappedShape::Single,
    }
}

/// Probe-loop behavior switches derived from kind and strictness.
#[derive(Copy, Clone, Debug)]
pub(crate) struct JoinFeatures {
    pub(crate) is_any: bool,
    pub(crate) is_all: bool,
    pub(crate) is_asof: bool,
    pub(crate) is_semi: bool,
    pub(crate) is_anti: bool,
    pub(crate) left: bool,
    pub(crate) right: bool,
    pub(crate) inner: bool,
    pub(crate) full: bool,
    /// Left columns repeat per matched build row.
    pub(crate) need_replication: bool,
    /// Left columns are filtered to rows the strictness keeps.
    pub(crate) need_filter: bool,
    /// Probe misses still produce an output row (right side defaulted).
    pub(crate) add_missing: bool,
    /// Build rows must be marked used for later unmatched emission or
    /// first-match races.
    pub(crate) need_flags: bool,
}

impl JoinFeatures {
    pub(crate) fn new(kind: JoinKind, strictness: JoinStrictness) -> Self {
        let is_any = strictness == JoinStrictness::Any;
        let is_all = strictness == JoinStrictness::All;
        let is_asof = strictness == JoinStrictness::Asof;
        let is_semi = strictness == JoinStrictness::Semi;
        let is_anti = strictness == JoinStrictness::Anti;

        let left = kind == JoinKind::Left;
        let right = kind == JoinKind::Right;
        let inner = kind == JoinKind::Inner;
        let full = kind == JoinKind::Full;

        let need_replication = is_all || (is_any && right) || (is_semi && right);
        let need_filter =
            !need_replication && (inner || right || (is_semi && left) || (is_anti && left));
        let add_missing = (left || full) && !is_semi;

        let need_flags = match strictness {
            JoinStrictness::Asof => false,
            JoinStrictness::Any => inner || right || full,
            JoinStrictness::All => right || full,
            JoinStrictness::Semi | JoinStrictness::Anti => right,
            JoinStrictness::RightAny => right || full,
        };

        Self {
            is_any,
            is_all,
            is_asof,
            is_semi,
            is_anti,
            left,
            right,
            inner,
            full,
            need_replication,
            need_filter,
            add_missing,
            need_flags,
        }
    }
}
