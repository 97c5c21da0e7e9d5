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
use arrow::error::ArrowError;
use thiserror::Error;

/// Error raised by join build, probe, and lookup paths.
///
/// Each variant is a distinct failure class so callers can match on the
/// condition rather than parse messages.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("logical error: {0}")]
    Logical(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("no such column in table: {0}")]
    NoSuchColumn(String),

    #[error("number of arguments doesn't match: {0}")]
    ArgumentCountMismatch(String),

    #[error("size limit exceeded for join: {0}")]
    SizeLimitExceeded(String),

    #[error("unsupported join keys: {0}")]
    UnsupportedJoinKeys(String),

    #[error("incompatible type of join: {0}")]
    IncompatibleJoin(String),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

pub type Result<T> = std::result::Result<T, JoinError>;

impl JoinError {
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn logical(msg: impl Into<String>) -> Self {
        Self::Logical(msg.into())
    }
}
