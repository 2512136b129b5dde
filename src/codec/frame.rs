//! Columnar serialized frame for one partition
//!
//! The frame is self-describing: every column carries its name and a type
//! tag, so decoding resolves columns by name and rejects a column whose
//! type does not match the schema instead of trusting position.
//!
//! ```text
//! Frame { format: u16, row_count: u64, columns: [Column { name, values }] }
//! values = Text([String]) | UInt([Option<u32>])
//! ```
//!
//! Encoded with bincode (varint integers). Decoding runs under a byte limit
//! equal to the input length, so no length field can make the decoder
//! allocate more than the input could possibly describe.

use crate::error::{CodecError, SchemaError};
use crate::record::Record;
use ahash::AHashSet;
use bincode::Options;
use serde::{Deserialize, Serialize};

/// Current frame layout version
pub const FRAME_FORMAT: u16 = 1;

pub(crate) const COL_CODE: &str = "code";
pub(crate) const COL_EASTING: &str = "easting";
pub(crate) const COL_NORTHING: &str = "northing";
pub(crate) const COL_REGION: &str = "region_code";

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    format: u16,
    row_count: u64,
    columns: Vec<Column>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Column {
    name: String,
    values: ColumnValues,
}

#[derive(Debug, Serialize, Deserialize)]
enum ColumnValues {
    Text(Vec<String>),
    UInt(Vec<Option<u32>>),
}

impl ColumnValues {
    fn type_name(&self) -> &'static str {
        match self {
            ColumnValues::Text(_) => "text",
            ColumnValues::UInt(_) => "uint",
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnValues::Text(v) => v.len(),
            ColumnValues::UInt(v) => v.len(),
        }
    }
}

fn map_bincode_error(e: bincode::Error) -> CodecError {
    match *e {
        bincode::ErrorKind::Io(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            CodecError::Truncated("frame ended early".to_string())
        }
        bincode::ErrorKind::SizeLimit => {
            CodecError::Truncated("declared length runs past end of frame".to_string())
        }
        other => CodecError::Serialization(other.to_string()),
    }
}

/// Serialize records into a frame
///
/// Rejects duplicate codes, the same as [`read_frame`].
pub fn write_frame(records: &[Record]) -> Result<Vec<u8>, CodecError> {
    check_unique(records)?;

    let frame = Frame {
        format: FRAME_FORMAT,
        row_count: records.len() as u64,
        columns: vec![
            Column {
                name: COL_CODE.to_string(),
                values: ColumnValues::Text(records.iter().map(|r| r.code().to_string()).collect()),
            },
            Column {
                name: COL_EASTING.to_string(),
                values: ColumnValues::UInt(records.iter().map(Record::easting).collect()),
            },
            Column {
                name: COL_NORTHING.to_string(),
                values: ColumnValues::UInt(records.iter().map(Record::northing).collect()),
            },
            Column {
                name: COL_REGION.to_string(),
                values: ColumnValues::Text(
                    records.iter().map(|r| r.region_code().to_string()).collect(),
                ),
            },
        ],
    };

    bincode::DefaultOptions::new()
        .serialize(&frame)
        .map_err(map_bincode_error)
}

/// Deserialize a frame back into validated records
pub fn read_frame(bytes: &[u8]) -> Result<Vec<Record>, CodecError> {
    let frame: Frame = bincode::DefaultOptions::new()
        .with_limit(bytes.len() as u64)
        .deserialize(bytes)
        .map_err(map_bincode_error)?;

    if frame.format != FRAME_FORMAT {
        return Err(CodecError::UnsupportedFormat(frame.format));
    }

    let row_count = frame.row_count;
    let mut columns = frame.columns;

    let codes = take_text(&mut columns, COL_CODE, row_count)?;
    let eastings = take_uint(&mut columns, COL_EASTING, row_count)?;
    let northings = take_uint(&mut columns, COL_NORTHING, row_count)?;
    let regions = take_text(&mut columns, COL_REGION, row_count)?;

    let mut records = Vec::with_capacity(codes.len());
    for (((code, easting), northing), region) in codes
        .into_iter()
        .zip(eastings)
        .zip(northings)
        .zip(regions)
    {
        records.push(Record::new(&code, easting, northing, region)?);
    }
    check_unique(&records)?;

    Ok(records)
}

fn check_unique(records: &[Record]) -> Result<(), CodecError> {
    let mut seen = AHashSet::with_capacity(records.len());
    match records.iter().find(|r| !seen.insert(r.code_abbr())) {
        Some(dup) => Err(CodecError::InvalidRecord(SchemaError::DuplicateCode(
            dup.code().to_string(),
        ))),
        None => Ok(()),
    }
}

fn take_column(
    columns: &mut Vec<Column>,
    name: &'static str,
    row_count: u64,
) -> Result<ColumnValues, CodecError> {
    let pos = columns
        .iter()
        .position(|c| c.name == name)
        .ok_or(CodecError::MissingColumn(name))?;
    let values = columns.swap_remove(pos).values;

    if values.len() as u64 != row_count {
        return Err(CodecError::ColumnLength {
            column: name,
            expected: row_count,
            found: values.len() as u64,
        });
    }
    Ok(values)
}

fn take_text(
    columns: &mut Vec<Column>,
    name: &'static str,
    row_count: u64,
) -> Result<Vec<String>, CodecError> {
    match take_column(columns, name, row_count)? {
        ColumnValues::Text(values) => Ok(values),
        other => Err(CodecError::ColumnType {
            column: name,
            expected: "text",
            found: other.type_name(),
        }),
    }
}

fn take_uint(
    columns: &mut Vec<Column>,
    name: &'static str,
    row_count: u64,
) -> Result<Vec<Option<u32>>, CodecError> {
    match take_column(columns, name, row_count)? {
        ColumnValues::UInt(values) => Ok(values),
        other => Err(CodecError::ColumnType {
            column: name,
            expected: "uint",
            found: other.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Record> {
        vec![
            Record::new("AB1 2CD", Some(394251), Some(806376), "S12000033").unwrap(),
            Record::new("AB1 3EF", None, None, "").unwrap(),
        ]
    }

    fn encode_raw(frame: &Frame) -> Vec<u8> {
        bincode::DefaultOptions::new().serialize(frame).unwrap()
    }

    #[test]
    fn test_frame_roundtrip() {
        let records = sample();
        let bytes = write_frame(&records).unwrap();
        assert_eq!(read_frame(&bytes).unwrap(), records);
    }

    #[test]
    fn test_empty_frame() {
        let bytes = write_frame(&[]).unwrap();
        assert!(read_frame(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_columns_resolved_by_name() {
        let frame = Frame {
            format: FRAME_FORMAT,
            row_count: 1,
            columns: vec![
                Column {
                    name: COL_REGION.into(),
                    values: ColumnValues::Text(vec!["E09000001".into()]),
                },
                Column {
                    name: "extra".into(),
                    values: ColumnValues::Text(vec!["ignored".into()]),
                },
                Column {
                    name: COL_NORTHING.into(),
                    values: ColumnValues::UInt(vec![Some(2)]),
                },
                Column {
                    name: COL_EASTING.into(),
                    values: ColumnValues::UInt(vec![Some(1)]),
                },
                Column {
                    name: COL_CODE.into(),
                    values: ColumnValues::Text(vec!["EC1A 1BB".into()]),
                },
            ],
        };

        let records = read_frame(&encode_raw(&frame)).unwrap();
        assert_eq!(
            records,
            vec![Record::new("EC1A 1BB", Some(1), Some(2), "E09000001").unwrap()]
        );
    }

    #[test]
    fn test_column_type_mismatch() {
        let frame = Frame {
            format: FRAME_FORMAT,
            row_count: 1,
            columns: vec![
                Column {
                    name: COL_CODE.into(),
                    values: ColumnValues::UInt(vec![Some(7)]),
                },
            ],
        };

        assert_eq!(
            read_frame(&encode_raw(&frame)),
            Err(CodecError::ColumnType {
                column: COL_CODE,
                expected: "text",
                found: "uint",
            })
        );
    }

    #[test]
    fn test_missing_column_and_length_mismatch() {
        let frame = Frame {
            format: FRAME_FORMAT,
            row_count: 2,
            columns: vec![Column {
                name: COL_CODE.into(),
                values: ColumnValues::Text(vec!["AB1 2CD".into()]),
            }],
        };
        assert!(matches!(
            read_frame(&encode_raw(&frame)),
            Err(CodecError::ColumnLength { column: COL_CODE, expected: 2, found: 1 })
        ));

        let frame = Frame {
            format: FRAME_FORMAT,
            row_count: 0,
            columns: vec![],
        };
        assert_eq!(
            read_frame(&encode_raw(&frame)),
            Err(CodecError::MissingColumn(COL_CODE))
        );
    }

    #[test]
    fn test_unsupported_format() {
        let frame = Frame {
            format: 99,
            row_count: 0,
            columns: vec![],
        };
        assert_eq!(
            read_frame(&encode_raw(&frame)),
            Err(CodecError::UnsupportedFormat(99))
        );
    }

    #[test]
    fn test_truncated_frame() {
        let bytes = write_frame(&sample()).unwrap();
        for len in [0, 1, bytes.len() / 2, bytes.len() - 1] {
            assert!(read_frame(&bytes[..len]).is_err(), "prefix of {} bytes accepted", len);
        }
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let record = Record::new("AB1 2CD", None, None, "").unwrap();
        let spaced = Record::new("ab12cd", None, None, "").unwrap();
        assert!(matches!(
            write_frame(&[record, spaced]),
            Err(CodecError::InvalidRecord(SchemaError::DuplicateCode(_)))
        ));

        let frame = Frame {
            format: FRAME_FORMAT,
            row_count: 2,
            columns: vec![
                Column {
                    name: COL_CODE.into(),
                    values: ColumnValues::Text(vec!["AB1 2CD".into(), "AB12CD".into()]),
                },
                Column {
                    name: COL_EASTING.into(),
                    values: ColumnValues::UInt(vec![None, None]),
                },
                Column {
                    name: COL_NORTHING.into(),
                    values: ColumnValues::UInt(vec![None, None]),
                },
                Column {
                    name: COL_REGION.into(),
                    values: ColumnValues::Text(vec![String::new(), String::new()]),
                },
            ],
        };
        assert!(matches!(
            read_frame(&encode_raw(&frame)),
            Err(CodecError::InvalidRecord(SchemaError::DuplicateCode(_)))
        ));
    }
}
