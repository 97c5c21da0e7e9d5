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
use std::sync::atomic::{AtomicBool, Ordering};

/// Flag address space: single-disjunct joins mark hash-table cells, joins
/// with several disjuncts mark build rows (a row may live in more than one
/// table there, so cell ids are not unique).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum FlagScope {
    PerCell,
    PerRow,
}

/// "Matched by some probe row" bits shared by all probe threads.
///
/// Disabled when the kind/strictness pair never emits unmatched build rows
/// and never races on first-match; all operations degrade to no-ops then.
pub(crate) struct UsedFlags {
    flags: Vec<AtomicBool>,
    scope: FlagScope,
    enabled: bool,
}

impl UsedFlags {
    pub(crate) fn new(scope: FlagScope, enabled: bool) -> Self {
        Self {
            flags: Vec::new(),
            scope,
            enabled,
        }
    }

    pub(crate) fn scope(&self) -> FlagScope {
        self.scope
    }

    pub(crate) fn len(&self) -> usize {
        self.flags.len()
    }

    /// Grow to `size` bits, preserving already-set bits. Called after every
    /// build chunk; probing never resizes.
    pub(crate) fn reinit(&mut self, size: usize) {
        if !self.enabled {
            return;
        }
        while self.flags.len() < size {
            self.flags.push(AtomicBool::new(false));
        }
    }

    pub(crate) fn set_used(&self, index: usize) {
        if !self.enabled {
            return;
        }
        self.flags[index].store(true, Ordering::Relaxed);
    }

    /// Flip the bit 0 -> 1; returns whether this call was the one that
    /// flipped it. Relaxed fast path, strong CAS to pick exactly one winner
    /// across threads. Always "wins" when flags are disabled.
    pub(crate) fn set_used_once(&self, index: usize) -> bool {
        if !self.enabled {
            return true;
        }
        if self.flags[index].load(Ordering::Relaxed) {
            return false;
        }
        self.flags[index]
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn is_used(&self, index: usize) -> bool {
        if !self.enabled {
            return false;
        }
        self.flags[index].load(Ordering::Relaxed)
    }
}
