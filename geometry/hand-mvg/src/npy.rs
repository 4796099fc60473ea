//! Minimal reader and writer for NumPy `.npy` arrays of floating point values.
//!
//! Reading accepts format versions 1.0, 2.0 and 3.0, `f4` or `f8` data in
//! either byte order and C or Fortran memory layout. Writing always produces
//! version 1.0, little-endian `f8`, C order.

use std::io::{Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{MvgError, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;
const MAX_PREALLOC: usize = 1 << 16;

/// Array data read from a `.npy` file, converted to `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub fortran_order: bool,
    /// Elements in file order.
    pub data: Vec<f64>,
}

impl NpyArray {
    /// Return the elements in row-major (C) order.
    pub fn into_row_major(self) -> Vec<f64> {
        if !self.fortran_order || self.shape.len() < 2 {
            return self.data;
        }
        let ndim = self.shape.len();
        // Strides of the Fortran layout.
        let mut f_strides = vec![1usize; ndim];
        for i in 1..ndim {
            f_strides[i] = f_strides[i - 1] * self.shape[i - 1];
        }
        let mut out = Vec::with_capacity(self.data.len());
        let mut idx = vec![0usize; ndim];
        for _ in 0..self.data.len() {
            let offset: usize = idx.iter().zip(f_strides.iter()).map(|(i, s)| i * s).sum();
            out.push(self.data[offset]);
            // Advance the C-order multi-index.
            for d in (0..ndim).rev() {
                idx[d] += 1;
                if idx[d] < self.shape[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F4(Endian),
    F8(Endian),
}

fn format_err<S: Into<String>>(msg: S) -> MvgError {
    MvgError::NpyFormat(msg.into())
}

/// Read a `.npy` array of `f4` or `f8` values.
pub fn read_f64<Rd: Read>(mut rdr: Rd) -> Result<NpyArray> {
    let mut magic = [0u8; 6];
    rdr.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(format_err("bad magic string"));
    }
    let major = rdr.read_u8()?;
    let _minor = rdr.read_u8()?;
    let header_len = match major {
        1 => rdr.read_u16::<LittleEndian>()? as usize,
        2 | 3 => rdr.read_u32::<LittleEndian>()? as usize,
        v => return Err(format_err(format!("format version {v} not supported"))),
    };
    let mut header = vec![0u8; header_len];
    rdr.read_exact(&mut header)?;
    let header = if major == 3 {
        String::from_utf8(header).map_err(|_| format_err("header is not UTF-8"))?
    } else {
        header.iter().map(|&b| b as char).collect()
    };

    let (dtype, fortran_order, shape) = parse_header(&header)?;
    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| format_err(format!("shape {shape:?} is too large")))?;
    // A payload shorter than the header claims ends in an IO error below.
    let mut data = Vec::with_capacity(count.min(MAX_PREALLOC));
    match dtype {
        Dtype::F8(Endian::Little) => {
            for _ in 0..count {
                data.push(rdr.read_f64::<LittleEndian>()?);
            }
        }
        Dtype::F8(Endian::Big) => {
            for _ in 0..count {
                data.push(rdr.read_f64::<BigEndian>()?);
            }
        }
        Dtype::F4(Endian::Little) => {
            for _ in 0..count {
                data.push(rdr.read_f32::<LittleEndian>()? as f64);
            }
        }
        Dtype::F4(Endian::Big) => {
            for _ in 0..count {
                data.push(rdr.read_f32::<BigEndian>()? as f64);
            }
        }
    }
    Ok(NpyArray {
        shape,
        fortran_order,
        data,
    })
}

/// Write `data` (row-major) as a version 1.0 `<f8` array with `shape`.
pub fn write_f64<W: Write>(mut wtr: W, shape: &[usize], data: &[f64]) -> Result<()> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(MvgError::InvalidShape {
            expected: format!("{expected} elements"),
            found: format!("{} elements", data.len()),
        });
    }
    let shape_str = match shape {
        [n] => format!("({n},)"),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header =
        format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {shape_str}, }}");
    // magic (6) + version (2) + header length (2) + header, ending in '\n'
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    let pad = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat(' ').take(pad));
    header.push('\n');
    let header_len =
        u16::try_from(header.len()).map_err(|_| format_err("header too long for version 1.0"))?;

    wtr.write_all(MAGIC)?;
    wtr.write_all(&[1, 0])?;
    wtr.write_u16::<LittleEndian>(header_len)?;
    wtr.write_all(header.as_bytes())?;
    for x in data {
        wtr.write_f64::<LittleEndian>(*x)?;
    }
    wtr.flush()?;
    Ok(())
}

fn parse_header(header: &str) -> Result<(Dtype, bool, Vec<usize>)> {
    let descr = dict_value(header, "descr")?;
    let descr = descr.trim().trim_matches(|c: char| c == '\'' || c == '"');
    let native = if cfg!(target_endian = "big") {
        Endian::Big
    } else {
        Endian::Little
    };
    let (endian, kind) = if let Some(rest) = descr.strip_prefix('<') {
        (Endian::Little, rest)
    } else if let Some(rest) = descr.strip_prefix('>') {
        (Endian::Big, rest)
    } else if let Some(rest) = descr.strip_prefix(|c: char| c == '=' || c == '|') {
        (native, rest)
    } else {
        (native, descr)
    };
    let dtype = match kind {
        "f8" => Dtype::F8(endian),
        "f4" => Dtype::F4(endian),
        other => return Err(format_err(format!("dtype '{other}' not supported"))),
    };

    let fortran_order = match dict_value(header, "fortran_order")?.trim() {
        "True" => true,
        "False" => false,
        other => return Err(format_err(format!("bad fortran_order '{other}'"))),
    };

    let shape_str = dict_value(header, "shape")?;
    let shape_str = shape_str
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format_err("shape is not a tuple"))?;
    let shape = shape_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| format_err(format!("bad shape entry '{s}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((dtype, fortran_order, shape))
}

/// Extract the raw text of the value stored under `key` in the header dict.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let needle_sq = format!("'{key}'");
    let needle_dq = format!("\"{key}\"");
    let start = header
        .find(&needle_sq)
        .map(|i| i + needle_sq.len())
        .or_else(|| header.find(&needle_dq).map(|i| i + needle_dq.len()))
        .ok_or_else(|| format_err(format!("header has no '{key}'")))?;
    let rest = header[start..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| format_err(format!("malformed '{key}' entry")))?
        .trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find(|c: char| c == ',' || c == '}')
    }
    .ok_or_else(|| format_err(format!("unterminated '{key}' entry")))?;
    Ok(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_npy(version: u8, header_dict: &str, payload: &[u8]) -> Vec<u8> {
        let mut header = header_dict.to_string();
        header.push('\n');
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&[version, 0]);
        if version == 1 {
            buf.write_u16::<LittleEndian>(header.len() as u16).unwrap();
        } else {
            buf.write_u32::<LittleEndian>(header.len() as u32).unwrap();
        }
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_written_header_is_aligned() {
        let mut buf = Vec::new();
        let data: Vec<f64> = (0..12).map(|i| i as f64).collect();
        write_f64(&mut buf, &[3, 4], &data).unwrap();
        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        assert_eq!((10 + header_len) % HEADER_ALIGN, 0);
        assert_eq!(buf[10 + header_len - 1], b'\n');
        assert_eq!(buf.len(), 10 + header_len + 12 * 8);

        let arr = read_f64(&buf[..]).unwrap();
        assert_eq!(arr.shape, vec![3, 4]);
        assert!(!arr.fortran_order);
        assert_eq!(arr.into_row_major(), data);
    }

    #[test]
    fn test_big_endian_f4_version_2() {
        let mut payload = Vec::new();
        for x in [1.5f32, -2.0, 0.25] {
            payload.write_f32::<BigEndian>(x).unwrap();
        }
        let buf = raw_npy(
            2,
            "{'descr': '>f4', 'fortran_order': False, 'shape': (3,), }",
            &payload,
        );
        let arr = read_f64(&buf[..]).unwrap();
        assert_eq!(arr.shape, vec![3]);
        assert_eq!(arr.data, vec![1.5, -2.0, 0.25]);
    }

    #[test]
    fn test_fortran_order_is_transposed() {
        // The 2x3 matrix [[1, 2, 3], [4, 5, 6]] stored column by column.
        let mut payload = Vec::new();
        for x in [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0] {
            payload.write_f64::<LittleEndian>(x).unwrap();
        }
        let buf = raw_npy(
            1,
            "{'descr': '<f8', 'fortran_order': True, 'shape': (2, 3), }",
            &payload,
        );
        let arr = read_f64(&buf[..]).unwrap();
        assert!(arr.fortran_order);
        assert_eq!(arr.into_row_major(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_rejects_integer_dtype() {
        let buf = raw_npy(
            1,
            "{'descr': '<i8', 'fortran_order': False, 'shape': (1,), }",
            &[0u8; 8],
        );
        assert!(matches!(read_f64(&buf[..]), Err(MvgError::NpyFormat(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let buf = raw_npy(
            1,
            "{'descr': '<f8', 'fortran_order': False, 'shape': (2,), }",
            &[0u8; 8],
        );
        assert!(matches!(read_f64(&buf[..]), Err(MvgError::Io { .. })));
    }

    #[test]
    fn test_oversized_shape() {
        let buf = raw_npy(
            1,
            "{'descr': '<f8', 'fortran_order': False, 'shape': (4611686018427387904, 8), }",
            &[0u8; 8],
        );
        assert!(matches!(read_f64(&buf[..]), Err(MvgError::NpyFormat(_))));

        // Representable but far larger than the payload.
        let buf = raw_npy(
            1,
            "{'descr': '<f8', 'fortran_order': False, 'shape': (200000000000,), }",
            &[0u8; 16],
        );
        assert!(matches!(read_f64(&buf[..]), Err(MvgError::Io { .. })));
    }

    #[test]
    fn test_shape_mismatch_on_write() {
        let mut buf = Vec::new();
        let result = write_f64(&mut buf, &[3, 4], &[0.0; 11]);
        assert!(matches!(result, Err(MvgError::InvalidShape { .. })));
    }
}
