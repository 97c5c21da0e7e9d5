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
//! Integration tests for the hash-join engine.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use novajoin::{
    AsofInequality, Chunk, DictLookup, DictionaryReader, HashJoin, JoinDesc, JoinError, JoinKind,
    JoinStrictness, OverflowMode, SizeLimits,
};

fn schema_of(fields: &[(&str, DataType, bool)]) -> SchemaRef {
    Arc::new(Schema::new(
        fields
            .iter()
            .map(|(name, data_type, nullable)| Field::new(*name, data_type.clone(), *nullable))
            .collect::<Vec<_>>(),
    ))
}

fn int_col(values: &[Option<i64>]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

fn str_col(values: &[Option<&str>]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

fn chunk_of(schema: &SchemaRef, columns: Vec<ArrayRef>) -> Chunk {
    Chunk::new(RecordBatch::try_new(schema.clone(), columns).expect("record batch"))
}

fn single_keys(left: &str, right: &str) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    (
        vec![vec![left.to_string()]],
        vec![vec![right.to_string()]],
    )
}

fn i64_at(chunk: &Chunk, column: usize) -> Vec<Option<i64>> {
    let array = chunk.columns()[column]
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("int64 column");
    (0..array.len())
        .map(|row| (!array.is_null(row)).then(|| array.value(row)))
        .collect()
}

fn str_at(chunk: &Chunk, column: usize) -> Vec<Option<String>> {
    let array = chunk.columns()[column]
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("string column");
    (0..array.len())
        .map(|row| (!array.is_null(row)).then(|| array.value(row).to_string()))
        .collect()
}

fn pairs(chunk: &Chunk, key_col: usize, value_col: usize) -> Vec<(Option<i64>, Option<String>)> {
    i64_at(chunk, key_col)
        .into_iter()
        .zip(str_at(chunk, value_col))
        .collect()
}

/// left(k) JOIN right(k, v) keyed on k; right side {1 -> A, 2 -> B, 2 -> C}.
fn kv_join(kind: JoinKind, strictness: JoinStrictness) -> HashJoin {
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let right = schema_of(&[("k", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let (kl, kr) = single_keys("k", "k");
    let desc = JoinDesc::new(kind, strictness).with_keys(kl, kr);
    let mut join = HashJoin::try_create(desc, left, right.clone(), None).expect("join");
    let build = chunk_of(
        &right,
        vec![
            int_col(&[Some(1), Some(2), Some(2)]),
            str_col(&[Some("A"), Some("B"), Some("C")]),
        ],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));
    join
}

fn probe_123(join: &HashJoin) -> Chunk {
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let probe = chunk_of(&left, vec![int_col(&[Some(1), Some(2), Some(3)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert!(not_processed.is_none());
    out
}

#[test]
fn inner_all_emits_every_match() {
    let join = kv_join(JoinKind::Inner, JoinStrictness::All);
    let out = probe_123(&join);
    assert_eq!(
        pairs(&out, 0, 1),
        vec![
            (Some(1), Some("A".to_string())),
            (Some(2), Some("B".to_string())),
            (Some(2), Some("C".to_string())),
        ]
    );
}

#[test]
fn left_any_fills_misses_with_null() {
    let join = kv_join(JoinKind::Left, JoinStrictness::Any);
    let out = probe_123(&join);
    assert_eq!(
        pairs(&out, 0, 1),
        vec![
            (Some(1), Some("A".to_string())),
            (Some(2), Some("B".to_string())),
            (Some(3), None),
        ]
    );
}

#[test]
fn left_anti_keeps_only_misses() {
    let join = kv_join(JoinKind::Left, JoinStrictness::Anti);
    let out = probe_123(&join);
    assert_eq!(pairs(&out, 0, 1), vec![(Some(3), None)]);
}

#[test]
fn left_semi_emits_membership_once() {
    let join = kv_join(JoinKind::Left, JoinStrictness::Semi);
    let out = probe_123(&join);
    assert_eq!(
        pairs(&out, 0, 1),
        vec![
            (Some(1), Some("A".to_string())),
            (Some(2), Some("B".to_string())),
        ]
    );
}

#[test]
fn inner_any_uses_first_probe_row_per_key() {
    let join = kv_join(JoinKind::Inner, JoinStrictness::Any);
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let probe = chunk_of(&left, vec![int_col(&[Some(1), Some(1), Some(2)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    // The second probe row with key 1 loses the first-match race by design.
    assert_eq!(
        pairs(&out, 0, 1),
        vec![
            (Some(1), Some("A".to_string())),
            (Some(2), Some("B".to_string())),
        ]
    );
}

#[test]
fn building_in_halves_matches_single_build() {
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let right = schema_of(&[("k", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let (kl, kr) = single_keys("k", "k");
    let desc = JoinDesc::new(JoinKind::Inner, JoinStrictness::All).with_keys(kl, kr);
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    let first = chunk_of(
        &right,
        vec![int_col(&[Some(1), Some(2)]), str_col(&[Some("A"), Some("B")])],
    );
    let second = chunk_of(&right, vec![int_col(&[Some(2)]), str_col(&[Some("C")])]);
    assert!(join.add_build_chunk(&first, false).expect("build"));
    assert!(join.add_build_chunk(&second, false).expect("build"));
    assert_eq!(join.total_rows(), 3);
    assert!(join.total_bytes() > 0);

    let out = probe_123(&join);
    assert_eq!(
        pairs(&out, 0, 1),
        vec![
            (Some(1), Some("A".to_string())),
            (Some(2), Some("B".to_string())),
            (Some(2), Some("C".to_string())),
        ]
    );
}

#[test]
fn right_all_emits_unmatched_build_rows() {
    let left = schema_of(&[("lk", DataType::Int64, true)]);
    let right = schema_of(&[("rk", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let (kl, kr) = single_keys("lk", "rk");
    let desc = JoinDesc::new(JoinKind::Right, JoinStrictness::All).with_keys(kl, kr);
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    let build = chunk_of(
        &right,
        vec![int_col(&[Some(1), Some(2)]), str_col(&[Some("A"), Some("B")])],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));

    let probe = chunk_of(&left, vec![int_col(&[Some(1), Some(3)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    // Columns: lk, v, rk.
    assert_eq!(pairs(&out, 0, 1), vec![(Some(1), Some("A".to_string()))]);
    assert_eq!(i64_at(&out, 2), vec![Some(1)]);

    let mut stream = join.non_joined_chunks(1024).expect("non-joined stream");
    let rest = stream.next().expect("one chunk").expect("chunk");
    assert_eq!(pairs(&rest, 0, 1), vec![(None, Some("B".to_string()))]);
    assert_eq!(i64_at(&rest, 2), vec![Some(2)]);
    assert!(stream.next().is_none());
}

#[test]
fn full_all_partitions_build_rows_without_overlap() {
    let left = schema_of(&[("lk", DataType::Int64, true)]);
    let right = schema_of(&[("rk", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let (kl, kr) = single_keys("lk", "rk");
    let desc = JoinDesc::new(JoinKind::Full, JoinStrictness::All).with_keys(kl, kr);
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    let build = chunk_of(
        &right,
        vec![
            int_col(&[Some(1), None, Some(2)]),
            str_col(&[Some("A"), Some("B"), Some("C")]),
        ],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));

    let probe = chunk_of(&left, vec![int_col(&[Some(1)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert_eq!(pairs(&out, 0, 1), vec![(Some(1), Some("A".to_string()))]);

    // Unmatched hash-table rows come first, the NULL-key side list after.
    let mut rest: Vec<(Option<i64>, Option<String>, Option<i64>)> = Vec::new();
    let stream = join.non_joined_chunks(1024).expect("non-joined stream");
    for item in stream {
        let chunk = item.expect("chunk");
        let keys = i64_at(&chunk, 0);
        let values = str_at(&chunk, 1);
        let right_keys = i64_at(&chunk, 2);
        for ((lk, v), rk) in keys.into_iter().zip(values).zip(right_keys) {
            rest.push((lk, v, rk));
        }
    }
    assert_eq!(
        rest,
        vec![
            (None, Some("C".to_string()), Some(2)),
            (None, Some("B".to_string()), None),
        ]
    );
}

#[test]
fn right_semi_takes_whole_chain_once() {
    let left = schema_of(&[("lk", DataType::Int64, true)]);
    let right = schema_of(&[("rk", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let (kl, kr) = single_keys("lk", "rk");
    let desc = JoinDesc::new(JoinKind::Right, JoinStrictness::Semi).with_keys(kl, kr);
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    let build = chunk_of(
        &right,
        vec![
            int_col(&[Some(1), Some(1), Some(2)]),
            str_col(&[Some("A"), Some("B"), Some("C")]),
        ],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));

    let probe = chunk_of(&left, vec![int_col(&[Some(1), Some(1)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert_eq!(
        pairs(&out, 0, 1),
        vec![
            (Some(1), Some("A".to_string())),
            (Some(1), Some("B".to_string())),
        ]
    );
    assert!(join.non_joined_chunks(1024).is_none());
}

#[test]
fn right_anti_emits_only_unmatched_build_rows() {
    let left = schema_of(&[("lk", DataType::Int64, true)]);
    let right = schema_of(&[("rk", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let (kl, kr) = single_keys("lk", "rk");
    let desc = JoinDesc::new(JoinKind::Right, JoinStrictness::Anti).with_keys(kl, kr);
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    let build = chunk_of(
        &right,
        vec![
            int_col(&[Some(1), Some(1), Some(2)]),
            str_col(&[Some("A"), Some("B"), Some("C")]),
        ],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));

    let probe = chunk_of(&left, vec![int_col(&[Some(1)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert_eq!(out.len(), 0);

    let mut stream = join.non_joined_chunks(1024).expect("non-joined stream");
    let rest = stream.next().expect("one chunk").expect("chunk");
    assert_eq!(pairs(&rest, 0, 1), vec![(None, Some("C".to_string()))]);
    assert!(stream.next().is_none());
}

#[test]
fn asof_less_matches_greatest_smaller_time() {
    let left = schema_of(&[("k", DataType::Int64, true), ("t", DataType::Int64, false)]);
    let right = schema_of(&[
        ("k", DataType::Int64, true),
        ("t", DataType::Int64, false),
        ("v", DataType::Utf8, true),
    ]);
    let mut desc = JoinDesc::new(JoinKind::Inner, JoinStrictness::Asof).with_keys(
        vec![vec!["k".to_string(), "t".to_string()]],
        vec![vec!["k".to_string(), "t".to_string()]],
    );
    desc.asof_inequality = AsofInequality::Less;
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    let build = chunk_of(
        &right,
        vec![
            int_col(&[Some(1), Some(1)]),
            int_col(&[Some(10), Some(20)]),
            str_col(&[Some("A"), Some("B")]),
        ],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));

    let probe = chunk_of(
        &left,
        vec![int_col(&[Some(1), Some(1), Some(1)]), int_col(&[Some(15), Some(25), Some(10)])],
    );
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    // Columns: k, t (left), t (right ASOF key), v.
    assert_eq!(str_at(&out, 3), vec![Some("A".to_string()), Some("B".to_string())]);
    assert_eq!(i64_at(&out, 1), vec![Some(15), Some(25)]);
    assert_eq!(i64_at(&out, 2), vec![Some(10), Some(20)]);
}

#[test]
fn asof_construction_rejects_bad_shapes() {
    let left = schema_of(&[("k", DataType::Int64, true), ("t", DataType::Int64, false)]);
    let right = schema_of(&[
        ("k", DataType::Int64, true),
        ("t", DataType::Int64, false),
        ("v", DataType::Utf8, true),
    ]);

    let desc = JoinDesc::new(JoinKind::Right, JoinStrictness::Asof).with_keys(
        vec![vec!["k".to_string(), "t".to_string()]],
        vec![vec!["k".to_string(), "t".to_string()]],
    );
    let err = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect_err("kind");
    assert!(matches!(err, JoinError::NotImplemented(_)), "err={err}");

    let desc = JoinDesc::new(JoinKind::Left, JoinStrictness::Asof).with_keys(
        vec![vec!["t".to_string()]],
        vec![vec!["t".to_string()]],
    );
    let err = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect_err("arity");
    assert!(matches!(err, JoinError::Syntax(_)), "err={err}");

    let nullable_right = schema_of(&[
        ("k", DataType::Int64, true),
        ("t", DataType::Int64, true),
        ("v", DataType::Utf8, true),
    ]);
    let desc = JoinDesc::new(JoinKind::Left, JoinStrictness::Asof).with_keys(
        vec![vec!["k".to_string(), "t".to_string()]],
        vec![vec!["k".to_string(), "t".to_string()]],
    );
    let err = HashJoin::try_create(desc, left, nullable_right, None).expect_err("nullable");
    assert!(matches!(err, JoinError::NotImplemented(_)), "err={err}");
}

#[test]
fn disjuncts_dedup_rows_matched_by_both_key_sets() {
    let left = schema_of(&[("a", DataType::Int64, true), ("b", DataType::Int64, true)]);
    let right = schema_of(&[
        ("rk1", DataType::Int64, true),
        ("rk2", DataType::Int64, true),
        ("v", DataType::Utf8, true),
    ]);
    let desc = JoinDesc::new(JoinKind::Inner, JoinStrictness::All).with_keys(
        vec![vec!["a".to_string()], vec!["b".to_string()]],
        vec![vec!["rk1".to_string()], vec!["rk2".to_string()]],
    );
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    let build = chunk_of(
        &right,
        vec![
            int_col(&[Some(1), Some(2), Some(7)]),
            int_col(&[Some(5), Some(1), Some(7)]),
            str_col(&[Some("A"), Some("B"), Some("C")]),
        ],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));

    let probe = chunk_of(
        &left,
        vec![
            int_col(&[Some(1), Some(7), Some(9)]),
            int_col(&[Some(1), Some(7), Some(9)]),
        ],
    );
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    let mut rows: Vec<(Option<i64>, Option<String>)> = i64_at(&out, 0)
        .into_iter()
        .zip(str_at(&out, 2))
        .collect();
    rows.sort();
    // Row (1, 1) matches A via the first key set and B via the second; the
    // row matched by both key sets is emitted once.
    assert_eq!(
        rows,
        vec![
            (Some(1), Some("A".to_string())),
            (Some(1), Some("B".to_string())),
            (Some(7), Some("C".to_string())),
        ]
    );
}

#[test]
fn cross_join_suspends_and_resumes() {
    let left = schema_of(&[("l", DataType::Int64, true)]);
    let right = schema_of(&[("r", DataType::Utf8, true)]);
    let mut desc = JoinDesc::new(JoinKind::Cross, JoinStrictness::All);
    desc.max_joined_block_rows = 2;
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    let first = chunk_of(&right, vec![str_col(&[Some("x"), Some("y")])]);
    let second = chunk_of(&right, vec![str_col(&[Some("z")])]);
    assert!(join.add_build_chunk(&first, false).expect("build"));
    assert!(join.add_build_chunk(&second, false).expect("build"));

    let probe = chunk_of(&left, vec![int_col(&[Some(10), Some(20)])]);
    let mut out_rows: Vec<(Option<i64>, Option<String>)> = Vec::new();
    let mut not_processed = None;
    let mut iterations = 0;
    loop {
        let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
        out_rows.extend(pairs(&out, 0, 1));
        iterations += 1;
        if not_processed.is_none() {
            break;
        }
        assert!(iterations < 10, "cross join failed to converge");
    }
    assert!(iterations > 1, "expected at least one suspension");
    assert_eq!(
        out_rows,
        vec![
            (Some(10), Some("x".to_string())),
            (Some(10), Some("y".to_string())),
            (Some(10), Some("z".to_string())),
            (Some(20), Some("x".to_string())),
            (Some(20), Some("y".to_string())),
            (Some(20), Some("z".to_string())),
        ]
    );
}

#[test]
fn join_get_answers_point_lookups() {
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let right = schema_of(&[("k", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let (kl, kr) = single_keys("k", "k");
    let desc = JoinDesc::new(JoinKind::Left, JoinStrictness::Any).with_keys(kl, kr);
    let mut join = HashJoin::try_create(desc, left, right.clone(), None).expect("join");
    let build = chunk_of(
        &right,
        vec![int_col(&[Some(1), Some(2)]), str_col(&[Some("A"), Some("B")])],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));

    let keys = vec![int_col(&[Some(2), Some(9), None])];
    let column = join.join_get(&keys, "v").expect("join_get");
    let column = column
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("string column");
    assert_eq!(column.value(0), "B");
    assert!(column.is_null(1));
    assert!(column.is_null(2));

    let err = join.join_get(&keys, "nope").expect_err("missing column");
    assert!(matches!(err, JoinError::NoSuchColumn(_)), "err={err}");

    let too_many = vec![int_col(&[Some(1)]), int_col(&[Some(1)])];
    let err = join.join_get(&too_many, "v").expect_err("arity");
    assert!(matches!(err, JoinError::ArgumentCountMismatch(_)), "err={err}");

    let wrong_type = vec![str_col(&[Some("1")])];
    let err = join.join_get(&wrong_type, "v").expect_err("type");
    assert!(matches!(err, JoinError::TypeMismatch(_)), "err={err}");

    let inner = kv_join(JoinKind::Inner, JoinStrictness::All);
    let err = inner
        .join_get(&vec![int_col(&[Some(1)])], "v")
        .expect_err("kind");
    assert!(matches!(err, JoinError::IncompatibleJoin(_)), "err={err}");
}

#[test]
fn size_limits_throw_or_break() {
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let right = schema_of(&[("k", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let build = chunk_of(
        &right,
        vec![
            int_col(&[Some(1), Some(2), Some(3)]),
            str_col(&[Some("A"), Some("B"), Some("C")]),
        ],
    );

    let (kl, kr) = single_keys("k", "k");
    let mut desc = JoinDesc::new(JoinKind::Inner, JoinStrictness::All).with_keys(kl.clone(), kr.clone());
    desc.size_limits = SizeLimits {
        max_rows: 2,
        max_bytes: 0,
        overflow_mode: OverflowMode::Throw,
    };
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    let err = join.add_build_chunk(&build, true).expect_err("limit");
    assert!(matches!(err, JoinError::SizeLimitExceeded(_)), "err={err}");

    let mut desc = JoinDesc::new(JoinKind::Inner, JoinStrictness::All).with_keys(kl, kr);
    desc.size_limits = SizeLimits {
        max_rows: 2,
        max_bytes: 0,
        overflow_mode: OverflowMode::Break,
    };
    let mut join = HashJoin::try_create(desc, left, right, None).expect("join");
    assert!(!join.add_build_chunk(&build, true).expect("break mode"));
}

#[test]
fn building_after_probing_is_a_logic_error() {
    let mut join = kv_join(JoinKind::Left, JoinStrictness::Any);
    let _ = probe_123(&join);
    let right = schema_of(&[("k", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let build = chunk_of(&right, vec![int_col(&[Some(9)]), str_col(&[Some("Z")])]);
    let err = join.add_build_chunk(&build, false).expect_err("locked");
    assert!(matches!(err, JoinError::Logical(_)), "err={err}");
}

#[test]
fn reuse_joined_data_shares_the_build_side() {
    let donor = kv_join(JoinKind::Inner, JoinStrictness::All);
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let right = schema_of(&[("k", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let (kl, kr) = single_keys("k", "k");
    let desc = JoinDesc::new(JoinKind::Inner, JoinStrictness::All).with_keys(kl.clone(), kr.clone());
    let mut recipient = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    recipient.reuse_joined_data(&donor).expect("reuse");
    assert_eq!(recipient.total_rows(), 3);
    let out = probe_123(&recipient);
    assert_eq!(out.len(), 3);

    let desc = JoinDesc::new(JoinKind::Left, JoinStrictness::Any).with_keys(kl, kr);
    let mut mismatched = HashJoin::try_create(desc, left, right, None).expect("join");
    let err = mismatched.reuse_joined_data(&donor).expect_err("shape");
    assert!(matches!(err, JoinError::IncompatibleJoin(_)), "err={err}");
}

#[test]
fn empty_build_side_predicates() {
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let right = schema_of(&[("k", DataType::Int64, true), ("v", DataType::Utf8, true)]);
    let (kl, kr) = single_keys("k", "k");
    let desc = JoinDesc::new(JoinKind::Inner, JoinStrictness::All).with_keys(kl, kr);
    let join = HashJoin::try_create(desc, left.clone(), right, None).expect("join");
    assert!(join.empty());
    assert!(join.always_returns_empty_set());
    assert!(!join.over_dictionary());

    let probe = chunk_of(&left, vec![int_col(&[Some(1)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert_eq!(out.len(), 0);
}

struct TestDict {
    sample: SchemaRef,
    keys: Vec<i64>,
    values: Vec<&'static str>,
}

impl TestDict {
    fn new() -> Self {
        Self {
            sample: schema_of(&[("k", DataType::Int64, true), ("v", DataType::Utf8, true)]),
            keys: vec![1, 2],
            values: vec!["A", "B"],
        }
    }
}

impl DictionaryReader for TestDict {
    fn sample(&self) -> SchemaRef {
        self.sample.clone()
    }

    fn read_keys(&self, keys: &[ArrayRef]) -> novajoin::Result<DictLookup> {
        let probe = keys[0]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64 keys");
        let mut found = Vec::with_capacity(probe.len());
        let mut positions = Vec::with_capacity(probe.len());
        for row in 0..probe.len() {
            let hit = (!probe.is_null(row))
                .then(|| self.keys.iter().position(|k| *k == probe.value(row)))
                .flatten();
            found.push(hit.is_some());
            positions.push(hit.unwrap_or(0) as u32);
        }
        let chunk = chunk_of(
            &self.sample,
            vec![
                int_col(&self.keys.iter().map(|k| Some(*k)).collect::<Vec<_>>()),
                str_col(&self.values.iter().map(|v| Some(*v)).collect::<Vec<_>>()),
            ],
        );
        Ok(DictLookup {
            chunk,
            found,
            positions,
        })
    }
}

#[test]
fn dictionary_join_serves_left_any_and_anti() {
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let (kl, kr) = single_keys("k", "k");

    let desc = JoinDesc::new(JoinKind::Left, JoinStrictness::Any).with_keys(kl.clone(), kr.clone());
    let join = HashJoin::try_create(
        desc,
        left.clone(),
        schema_of(&[("k", DataType::Int64, true)]),
        Some(Arc::new(TestDict::new())),
    )
    .expect("join");
    assert!(join.over_dictionary());
    let probe = chunk_of(&left, vec![int_col(&[Some(2), Some(9)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert_eq!(
        pairs(&out, 0, 1),
        vec![(Some(2), Some("B".to_string())), (Some(9), None)]
    );

    let desc = JoinDesc::new(JoinKind::Left, JoinStrictness::Anti).with_keys(kl.clone(), kr.clone());
    let join = HashJoin::try_create(
        desc,
        left.clone(),
        schema_of(&[("k", DataType::Int64, true)]),
        Some(Arc::new(TestDict::new())),
    )
    .expect("join");
    let probe = chunk_of(&left, vec![int_col(&[Some(2), Some(9)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert_eq!(pairs(&out, 0, 1), vec![(Some(9), None)]);

    let desc = JoinDesc::new(JoinKind::Inner, JoinStrictness::All).with_keys(kl, kr);
    let err = HashJoin::try_create(
        desc,
        left,
        schema_of(&[("k", DataType::Int64, true)]),
        Some(Arc::new(TestDict::new())),
    )
    .expect_err("unsupported dictionary join");
    assert!(matches!(err, JoinError::IncompatibleJoin(_)), "err={err}");
}

#[test]
fn string_and_mixed_keys_pick_other_variants() {
    let left = schema_of(&[("k", DataType::Utf8, true)]);
    let right = schema_of(&[("k", DataType::Utf8, true), ("v", DataType::Int64, true)]);
    let (kl, kr) = single_keys("k", "k");
    let desc = JoinDesc::new(JoinKind::Left, JoinStrictness::Any).with_keys(kl, kr);
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    assert_eq!(join.variant_name(), "key_string");
    let build = chunk_of(
        &right,
        vec![str_col(&[Some("x"), Some("y")]), int_col(&[Some(1), Some(2)])],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));
    let probe = chunk_of(&left, vec![str_col(&[Some("y"), Some("q")])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert_eq!(i64_at(&out, 1), vec![Some(2), None]);

    let left = schema_of(&[("a", DataType::Utf8, true), ("b", DataType::Int64, true)]);
    let right = schema_of(&[
        ("a", DataType::Utf8, true),
        ("b", DataType::Int64, true),
        ("v", DataType::Int64, true),
    ]);
    let desc = JoinDesc::new(JoinKind::Inner, JoinStrictness::All).with_keys(
        vec![vec!["a".to_string(), "b".to_string()]],
        vec![vec!["a".to_string(), "b".to_string()]],
    );
    let mut join = HashJoin::try_create(desc, left.clone(), right.clone(), None).expect("join");
    assert_eq!(join.variant_name(), "hashed");
    let build = chunk_of(
        &right,
        vec![
            str_col(&[Some("x"), Some("x")]),
            int_col(&[Some(1), Some(2)]),
            int_col(&[Some(100), Some(200)]),
        ],
    );
    assert!(join.add_build_chunk(&build, false).expect("build"));
    let probe = chunk_of(
        &left,
        vec![str_col(&[Some("x"), Some("x")]), int_col(&[Some(2), Some(3)])],
    );
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert_eq!(i64_at(&out, 2), vec![Some(200)]);
}

#[test]
fn null_probe_keys_never_match() {
    let join = kv_join(JoinKind::Left, JoinStrictness::Any);
    let left = schema_of(&[("k", DataType::Int64, true)]);
    let probe = chunk_of(&left, vec![int_col(&[None, Some(1)])]);
    let mut not_processed = None;
    let out = join.join_chunk(&probe, &mut not_processed).expect("probe");
    assert_eq!(
        pairs(&out, 0, 1),
        vec![(None, None), (Some(1), Some("A".to_string()))]
    );
}
