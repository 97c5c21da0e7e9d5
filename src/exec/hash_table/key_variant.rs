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
use arrow::datatypes::DataType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JoinKeyVariant {
    /// No keys and not a cross join; probing such a join is a logic error.
    Empty,
    /// No join keys (cartesian product).
    Cross,
    /// Build side served by an external dictionary; no table is built.
    Dict,
    /// Single fixed-width key of 1/2/4/8 bytes.
    Key8,
    Key16,
    Key32,
    Key64,
    /// One 16-byte key, or several fixed-width keys packed into 16 bytes.
    Keys128,
    /// One 32-byte key, or several fixed-width keys packed into 32 bytes.
    Keys256,
    /// Single UTF-8 key stored directly in the hash map.
    KeyString,
    /// Single fixed-size binary key.
    KeyFixedString,
    /// Variable-length serialized row key (fallback for mixed or wide keys).
    Hashed,
}

/// Byte layout of keys packed into `Keys128`/`Keys256` buffers.
#[derive(Clone, Debug, Default)]
pub(crate) struct KeyLayout {
    pub(crate) slots: Vec<KeySlot>,
    pub(crate) total_bytes: usize,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct KeySlot {
    pub(crate) offset: usize,
    pub(crate) width: usize,
}

/// Pick the hash-table variant for one disjunct's key columns.
///
/// Applied top to bottom, first match wins. Null masks are stripped before
/// packing, so the rule looks at the underlying value types only.
pub(crate) fn choose_key_variant(types: &[DataType]) -> (JoinKeyVariant, KeyLayout) {
    if types.is_empty() {
        return (JoinKeyVariant::Cross, KeyLayout::default());
    }

    if types.len() == 1 {
        if let Some(width) = fixed_width_size(&types[0]) {
            let layout = pack_layout(&[width]);
            let variant = match width {
                1 => JoinKeyVariant::Key8,
                2 => JoinKeyVariant::Key16,
                4 => JoinKeyVariant::Key32,
                8 => JoinKeyVariant::Key64,
                16 => JoinKeyVariant::Keys128,
                32 => JoinKeyVariant::Keys256,
                _ => unreachable!("fixed key width not in 1, 2, 4, 8, 16, 32"),
            };
            return (variant, layout);
        }
    }

    let mut widths = Vec::with_capacity(types.len());
    let mut all_fixed = true;
    let mut total = 0usize;
    for data_type in types {
        match fixed_width_size(data_type) {
            Some(width) => {
                total += width;
                widths.push(width);
            }
            None => {
                all_fixed = false;
                break;
            }
        }
    }
    if all_fixed && total <= 16 {
        return (JoinKeyVariant::Keys128, pack_layout(&widths));
    }
    if all_fixed && total <= 32 {
        return (JoinKeyVariant::Keys256, pack_layout(&widths));
    }

    if types.len() == 1 {
        if matches!(types[0], DataType::Utf8) {
            return (JoinKeyVariant::KeyString, KeyLayout::default());
        }
        if matches!(types[0], DataType::FixedSizeBinary(_)) {
            return (JoinKeyVariant::KeyFixedString, KeyLayout::default());
        }
    }

    (JoinKeyVariant::Hashed, KeyLayout::default())
}

fn pack_layout(widths: &[usize]) -> KeyLayout {
    let mut slots = Vec::with_capacity(widths.len());
    let mut offset = 0usize;
    for width in widths {
        slots.push(KeySlot {
            offset,
            width: *width,
        });
        offset += width;
    }
    KeyLayout {
        slots,
        total_bytes: offset,
    }
}

pub(crate) fn fixed_width_size(data_type: &DataType) -> Option<usize> {
    let width = match data_type {
        DataType::Boolean => 1,
        DataType::Int8 | DataType::UInt8 => 1,
        DataType::Int16 | DataType::UInt16 => 2,
        DataType::Int32 | DataType::UInt32 => 4,
        DataType::Float32 => 4,
        DataType::Date32 => 4,
        DataType::Int64 | DataType::UInt64 => 8,
        DataType::Float64 => 8,
        DataType::Timestamp(_, _) => 8,
        DataType::Decimal128(_, _) => 16,
        DataType::Decimal256(_, _) => 32,
        _ => return None,
    };
    Some(width)
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::TimeUnit;

    use super::*;

    #[test]
    fn single_numeric_keys_pick_width_variant() {
        let cases = [
            (DataType::Int8, JoinKeyVariant::Key8),
            (DataType::UInt16, JoinKeyVariant::Key16),
            (DataType::Int32, JoinKeyVariant::Key32),
            (DataType::Float64, JoinKeyVariant::Key64),
            (
                DataType::Timestamp(TimeUnit::Microsecond, None),
                JoinKeyVariant::Key64,
            ),
            (DataType::Decimal128(20, 2), JoinKeyVariant::Keys128),
            (DataType::Decimal256(40, 2), JoinKeyVariant::Keys256),
        ];
        for (data_type, expected) in cases {
            let (variant, _) = choose_key_variant(std::slice::from_ref(&data_type));
            assert_eq!(variant, expected, "type={data_type:?}");
        }
    }

    #[test]
    fn packed_fixed_keys_fit_into_wide_buckets() {
        let (variant, layout) = choose_key_variant(&[DataType::Int64, DataType::Int32]);
        assert_eq!(variant, JoinKeyVariant::Keys128);
        assert_eq!(layout.total_bytes, 12);
        assert_eq!(layout.slots[1].offset, 8);

        let (variant, layout) =
            choose_key_variant(&[DataType::Int64, DataType::Int64, DataType::Int64]);
        assert_eq!(variant, JoinKeyVariant::Keys256);
        assert_eq!(layout.total_bytes, 24);
    }

    #[test]
    fn string_and_fallback_variants() {
        let (variant, _) = choose_key_variant(&[DataType::Utf8]);
        assert_eq!(variant, JoinKeyVariant::KeyString);
        let (variant, _) = choose_key_variant(&[DataType::FixedSizeBinary(20)]);
        assert_eq!(variant, JoinKeyVariant::KeyFixedString);
        let (variant, _) = choose_key_variant(&[DataType::Utf8, DataType::Int32]);
        assert_eq!(variant, JoinKeyVariant::Hashed);
        let (variant, _) = choose_key_variant(&[]);
        assert_eq!(variant, JoinKeyVariant::Cross);
    }
}
