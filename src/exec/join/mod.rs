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
//! Hash-join engine module exports.
//!
//! Responsibilities:
//! - Wires the build side (pinned chunks, per-disjunct key tables, used flags)
//!   to the probe, cross-join, non-joined, and dictionary lookup paths.
//! - Exposes the `HashJoin` facade consumed by callers feeding chunks.

pub mod cross;
pub mod desc;
pub mod dict;
pub mod hash_join;
pub mod non_joined;
pub(crate) mod build_side;
pub(crate) mod output;
pub(crate) mod probe;
pub(crate) mod row;
pub(crate) mod table;
pub(crate) mod used_flags;
