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
use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Decimal128Array, Decimal256Array,
    FixedSizeBinaryArray, Float32Array, Float64Array, Int8Array, Int16Array, Int32Array,
    Int64Array, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray, UInt8Array, UInt16Array, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, TimeUnit};

use crate::common::error::{JoinError, Result};
use crate::exec::hash_table::hash::{canonical_f32_bits, canonical_f64_bits};
use crate::exec::hash_table::key_variant::KeyLayout;

pub(crate) enum KeyArrayView<'a> {
    Boolean(&'a BooleanArray),
    Int8(&'a Int8Array),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    UInt8(&'a UInt8Array),
    UInt16(&'a UInt16Array),
    UInt32(&'a UInt32Array),
    UInt64(&'a UInt64Array),
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
    Date32(&'a Date32Array),
    TimestampSecond(&'a TimestampSecondArray),
    TimestampMillisecond(&'a TimestampMillisecondArray),
    TimestampMicrosecond(&'a TimestampMicrosecondArray),
    TimestampNanosecond(&'a TimestampNanosecondArray),
    Decimal128(&'a Decimal128Array),
    Decimal256(&'a Decimal256Array),
    Utf8(&'a StringArray),
    FixedSizeBinary(&'a FixedSizeBinaryArray),
}

/// Ordering domain of an ASOF key column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AsofKeyType {
    Int64,
    UInt64,
    Float64,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum AsofValue {
    Int(i64),
    UInt(u64),
    Float(f64),
}

pub(crate) fn asof_key_type(data_type: &DataType) -> Option<AsofKeyType> {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::Date32
        | DataType::Timestamp(_, _) => Some(AsofKeyType::Int64),
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            Some(AsofKeyType::UInt64)
        }
        DataType::Float32 | DataType::Float64 => Some(AsofKeyType::Float64),
        _ => None,
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, what: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| JoinError::logical(format!("failed to downcast to {what}")))
}

pub(crate) fn build_key_views(arrays: &[ArrayRef]) -> Result<Vec<KeyArrayView<'_>>> {
    let mut views = Vec::with_capacity(arrays.len());
    for array in arrays {
        let view = match array.data_type() {
            DataType::Boolean => KeyArrayView::Boolean(downcast(array, "BooleanArray")?),
            DataType::Int8 => KeyArrayView::Int8(downcast(array, "Int8Array")?),
            DataType::Int16 => KeyArrayView::Int16(downcast(array, "Int16Array")?),
            DataType::Int32 => KeyArrayView::Int32(downcast(array, "Int32Array")?),
            DataType::Int64 => KeyArrayView::Int64(downcast(array, "Int64Array")?),
            DataType::UInt8 => KeyArrayView::UInt8(downcast(array, "UInt8Array")?),
            DataType::UInt16 => KeyArrayView::UInt16(downcast(array, "UInt16Array")?),
            DataType::UInt32 => KeyArrayView::UInt32(downcast(array, "UInt32Array")?),
            DataType::UInt64 => KeyArrayView::UInt64(downcast(array, "UInt64Array")?),
            DataType::Float32 => KeyArrayView::Float32(downcast(array, "Float32Array")?),
            DataType::Float64 => KeyArrayView::Float64(downcast(array, "Float64Array")?),
            DataType::Date32 => KeyArrayView::Date32(downcast(array, "Date32Array")?),
            DataType::Timestamp(TimeUnit::Second, _) => {
                KeyArrayView::TimestampSecond(downcast(array, "TimestampSecondArray")?)
            }
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                KeyArrayView::TimestampMillisecond(downcast(array, "TimestampMillisecondArray")?)
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                KeyArrayView::TimestampMicrosecond(downcast(array, "TimestampMicrosecondArray")?)
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {
                KeyArrayView::TimestampNanosecond(downcast(array, "TimestampNanosecondArray")?)
            }
            DataType::Decimal128(_, _) => {
                KeyArrayView::Decimal128(downcast(array, "Decimal128Array")?)
            }
            DataType::Decimal256(_, _) => {
                KeyArrayView::Decimal256(downcast(array, "Decimal256Array")?)
            }
            DataType::Utf8 => KeyArrayView::Utf8(downcast(array, "StringArray")?),
            DataType::FixedSizeBinary(_) => {
                KeyArrayView::FixedSizeBinary(downcast(array, "FixedSizeBinaryArray")?)
            }
            other => {
                return Err(JoinError::UnsupportedJoinKeys(format!(
                    "key column type {other} has no packed representation"
                )));
            }
        };
        views.push(view);
    }
    Ok(views)
}

impl KeyArrayView<'_> {
    /// Write the fixed-width little-endian value bytes of `row` into `out`.
    /// Callers only pass rows that passed the null mask.
    pub(crate) fn write_fixed(&self, row: usize, out: &mut [u8]) -> Result<()> {
        match self {
            KeyArrayView::Boolean(arr) => out[0] = arr.value(row) as u8,
            KeyArrayView::Int8(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::Int16(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::Int32(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::Int64(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::UInt8(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::UInt16(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::UInt32(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::UInt64(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::Float32(arr) => {
                out.copy_from_slice(&canonical_f32_bits(arr.value(row)).to_le_bytes())
            }
            KeyArrayView::Float64(arr) => {
                out.copy_from_slice(&canonical_f64_bits(arr.value(row)).to_le_bytes())
            }
            KeyArrayView::Date32(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::TimestampSecond(arr) => {
                out.copy_from_slice(&arr.value(row).to_le_bytes())
            }
            KeyArrayView::TimestampMillisecond(arr) => {
                out.copy_from_slice(&arr.value(row).to_le_bytes())
            }
            KeyArrayView::TimestampMicrosecond(arr) => {
                out.copy_from_slice(&arr.value(row).to_le_bytes())
            }
            KeyArrayView::TimestampNanosecond(arr) => {
                out.copy_from_slice(&arr.value(row).to_le_bytes())
            }
            KeyArrayView::Decimal128(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::Decimal256(arr) => out.copy_from_slice(&arr.value(row).to_le_bytes()),
            KeyArrayView::Utf8(_) | KeyArrayView::FixedSizeBinary(_) => {
                return Err(JoinError::logical(
                    "variable-length key column in fixed key packer",
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn asof_value(&self, row: usize) -> Result<AsofValue> {
        let value = match self {
            KeyArrayView::Int8(arr) => AsofValue::Int(arr.value(row) as i64),
            KeyArrayView::Int16(arr) => AsofValue::Int(arr.value(row) as i64),
            KeyArrayView::Int32(arr) => AsofValue::Int(arr.value(row) as i64),
            KeyArrayView::Int64(arr) => AsofValue::Int(arr.value(row)),
            KeyArrayView::Date32(arr) => AsofValue::Int(arr.value(row) as i64),
            KeyArrayView::TimestampSecond(arr) => AsofValue::Int(arr.value(row)),
            KeyArrayView::TimestampMillisecond(arr) => AsofValue::Int(arr.value(row)),
            KeyArrayView::TimestampMicrosecond(arr) => AsofValue::Int(arr.value(row)),
            KeyArrayView::TimestampNanosecond(arr) => AsofValue::Int(arr.value(row)),
            KeyArrayView::UInt8(arr) => AsofValue::UInt(arr.value(row) as u64),
            KeyArrayView::UInt16(arr) => AsofValue::UInt(arr.value(row) as u64),
            KeyArrayView::UInt32(arr) => AsofValue::UInt(arr.value(row) as u64),
            KeyArrayView::UInt64(arr) => AsofValue::UInt(arr.value(row)),
            KeyArrayView::Float32(arr) => AsofValue::Float(arr.value(row) as f64),
            KeyArrayView::Float64(arr) => AsofValue::Float(arr.value(row)),
            _ => {
                return Err(JoinError::not_implemented(
                    "ASOF inequality over a non-numeric key column",
                ));
            }
        };
        Ok(value)
    }
}

/// Pack one row's key values into `buf` per the layout. The buffer must be
/// zeroed by the caller so unused tail bytes compare equal.
pub(crate) fn pack_fixed_row(
    views: &[KeyArrayView<'_>],
    layout: &KeyLayout,
    row: usize,
    buf: &mut [u8; 32],
) -> Result<()> {
    for (view, slot) in views.iter().zip(layout.slots.iter()) {
        view.write_fixed(row, &mut buf[slot.offset..slot.offset + slot.width])?;
    }
    Ok(())
}

/// OR of the key columns' null bitmaps. `None` when no column carries nulls,
/// so probe loops can skip the per-row check entirely.
pub(crate) fn combined_null_mask(arrays: &[ArrayRef], rows: usize) -> Option<Vec<bool>> {
    if arrays.iter().all(|a| a.null_count() == 0) {
        return None;
    }
    let mut mask = vec![false; rows];
    for array in arrays {
        if array.null_count() == 0 {
            continue;
        }
        for (row, flag) in mask.iter_mut().enumerate() {
            *flag |= array.is_null(row);
        }
    }
    Some(mask)
}
