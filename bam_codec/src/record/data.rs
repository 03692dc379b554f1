use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io;
use std::str::FromStr;

/// Two-character key of an optional field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub [u8; 2]);

impl Tag {
    /// Keys must match `[A-Za-z][A-Za-z0-9]`.
    pub fn new(bytes: [u8; 2]) -> Result<Tag, String> {
        if bytes[0].is_ascii_alphabetic() && bytes[1].is_ascii_alphanumeric() {
            Ok(Tag(bytes))
        } else {
            Err(format!("invalid tag {:?}", String::from_utf8_lossy(&bytes)))
        }
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            &[a, b] => Tag::new([a, b]),
            _ => Err(format!("invalid tag {:?}", s)),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

/// Numeric array (`B` type). The variant is the element type.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Float(Vec<f32>),
}

impl Array {
    fn subtype(&self) -> u8 {
        match self {
            Array::Int8(_) => b'c',
            Array::UInt8(_) => b'C',
            Array::Int16(_) => b's',
            Array::UInt16(_) => b'S',
            Array::Int32(_) => b'i',
            Array::UInt32(_) => b'I',
            Array::Float(_) => b'f',
        }
    }

    fn len(&self) -> usize {
        match self {
            Array::Int8(v) => v.len(),
            Array::UInt8(v) => v.len(),
            Array::Int16(v) => v.len(),
            Array::UInt16(v) => v.len(),
            Array::Int32(v) => v.len(),
            Array::UInt32(v) => v.len(),
            Array::Float(v) => v.len(),
        }
    }

    fn item_size(&self) -> usize {
        match self {
            Array::Int8(_) | Array::UInt8(_) => 1,
            Array::Int16(_) | Array::UInt16(_) => 2,
            Array::Int32(_) | Array::UInt32(_) | Array::Float(_) => 4,
        }
    }
}

/// Typed value of an optional field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `A`: a single printable character
    Character(u8),
    /// `i` in SAM; any of `cCsSiI` in BAM
    Int(i64),
    /// `f`
    Float(f32),
    /// `Z`
    String(String),
    /// `H`: hex-encoded byte array
    Hex(String),
    /// `B`
    Array(Array),
}

const INT_MIN: i64 = i32::MIN as i64;
const INT_MAX: i64 = u32::MAX as i64;

fn parse_list<T: FromStr>(items: &[&str], subtype: char) -> Result<Vec<T>, String> {
    items
        .iter()
        .map(|item| {
            item.parse::<T>()
                .map_err(|_| format!("invalid {} array element {:?}", subtype, item))
        })
        .collect()
}

impl Value {
    /// Parses the `value` part of a SAM `TG:T:value` field.
    pub fn parse_sam(type_code: &str, text: &str) -> Result<Value, String> {
        match type_code {
            "A" => match text.as_bytes() {
                &[c] if (b'!'..=b'~').contains(&c) => Ok(Value::Character(c)),
                _ => Err(format!("invalid character value {:?}", text)),
            },
            "i" => {
                let v: i64 = text
                    .parse()
                    .map_err(|_| format!("invalid integer value {:?}", text))?;
                if (INT_MIN..=INT_MAX).contains(&v) {
                    Ok(Value::Int(v))
                } else {
                    Err(format!("integer value {} out of range", v))
                }
            }
            "f" => text
                .parse::<f32>()
                .map(Value::Float)
                .map_err(|_| format!("invalid float value {:?}", text)),
            "Z" => {
                if text.bytes().all(|c| (b' '..=b'~').contains(&c)) {
                    Ok(Value::String(text.to_string()))
                } else {
                    Err(format!("invalid string value {:?}", text))
                }
            }
            "H" => {
                if text.len() % 2 == 0 && text.bytes().all(|c| c.is_ascii_hexdigit()) {
                    Ok(Value::Hex(text.to_string()))
                } else {
                    Err(format!("invalid hex value {:?}", text))
                }
            }
            "B" => {
                let mut parts = text.split(',');
                let subtype = parts.next().unwrap_or("");
                let items: Vec<&str> = parts.collect();
                let array = match subtype {
                    "c" => Array::Int8(parse_list(&items, 'c')?),
                    "C" => Array::UInt8(parse_list(&items, 'C')?),
                    "s" => Array::Int16(parse_list(&items, 's')?),
                    "S" => Array::UInt16(parse_list(&items, 'S')?),
                    "i" => Array::Int32(parse_list(&items, 'i')?),
                    "I" => Array::UInt32(parse_list(&items, 'I')?),
                    "f" => Array::Float(parse_list(&items, 'f')?),
                    _ => return Err(format!("invalid array subtype {:?}", subtype)),
                };
                Ok(Value::Array(array))
            }
            _ => Err(format!("invalid tag type {:?}", type_code)),
        }
    }

    /// SAM type letter.
    pub fn sam_type(&self) -> char {
        match self {
            Value::Character(_) => 'A',
            Value::Int(_) => 'i',
            Value::Float(_) => 'f',
            Value::String(_) => 'Z',
            Value::Hex(_) => 'H',
            Value::Array(_) => 'B',
        }
    }

    // Smallest BAM integer type holding the value, samtools style.
    fn int_type(v: i64) -> Option<u8> {
        if v >= 0 {
            if v <= u8::MAX as i64 {
                Some(b'C')
            } else if v <= u16::MAX as i64 {
                Some(b'S')
            } else if v <= u32::MAX as i64 {
                Some(b'I')
            } else {
                None
            }
        } else if v >= i8::MIN as i64 {
            Some(b'c')
        } else if v >= i16::MIN as i64 {
            Some(b's')
        } else if v >= i32::MIN as i64 {
            Some(b'i')
        } else {
            None
        }
    }

    /// Number of bytes the value occupies in BAM, type code included.
    fn encoded_len(&self) -> usize {
        1 + match self {
            Value::Character(_) => 1,
            Value::Int(v) => match Value::int_type(*v) {
                Some(b'C') | Some(b'c') => 1,
                Some(b'S') | Some(b's') => 2,
                _ => 4,
            },
            Value::Float(_) => 4,
            Value::String(s) | Value::Hex(s) => s.len() + 1,
            Value::Array(a) => 1 + 4 + a.len() * a.item_size(),
        }
    }

    fn encode(&self, dest: &mut Vec<u8>) -> Result<(), String> {
        match self {
            Value::Character(c) => {
                dest.push(b'A');
                dest.push(*c);
            }
            Value::Int(v) => {
                let ty = Value::int_type(*v)
                    .ok_or_else(|| format!("integer value {} does not fit a BAM integer", v))?;
                dest.push(ty);
                let v = *v;
                let written = match ty {
                    b'C' => dest.write_u8(v as u8),
                    b'c' => dest.write_i8(v as i8),
                    b'S' => dest.write_u16::<LittleEndian>(v as u16),
                    b's' => dest.write_i16::<LittleEndian>(v as i16),
                    b'I' => dest.write_u32::<LittleEndian>(v as u32),
                    _ => dest.write_i32::<LittleEndian>(v as i32),
                };
                written.map_err(|e| e.to_string())?;
            }
            Value::Float(f) => {
                dest.push(b'f');
                dest.extend_from_slice(&f.to_le_bytes());
            }
            Value::String(s) => {
                dest.push(b'Z');
                dest.extend_from_slice(s.as_bytes());
                dest.push(0);
            }
            Value::Hex(s) => {
                dest.push(b'H');
                dest.extend_from_slice(s.as_bytes());
                dest.push(0);
            }
            Value::Array(array) => {
                dest.push(b'B');
                dest.push(array.subtype());
                let len = u32::try_from(array.len()).map_err(|_| "array too long".to_string())?;
                dest.extend_from_slice(&len.to_le_bytes());
                match array {
                    Array::Int8(v) => v.iter().for_each(|x| dest.extend_from_slice(&x.to_le_bytes())),
                    Array::UInt8(v) => dest.extend_from_slice(v),
                    Array::Int16(v) => v.iter().for_each(|x| dest.extend_from_slice(&x.to_le_bytes())),
                    Array::UInt16(v) => v.iter().for_each(|x| dest.extend_from_slice(&x.to_le_bytes())),
                    Array::Int32(v) => v.iter().for_each(|x| dest.extend_from_slice(&x.to_le_bytes())),
                    Array::UInt32(v) => v.iter().for_each(|x| dest.extend_from_slice(&x.to_le_bytes())),
                    Array::Float(v) => v.iter().for_each(|x| dest.extend_from_slice(&x.to_le_bytes())),
                }
            }
        }
        Ok(())
    }

    fn decode(ty: u8, data: &mut &[u8]) -> io::Result<Value> {
        let value = match ty {
            b'A' => Value::Character(data.read_u8()?),
            b'c' => Value::Int(data.read_i8()? as i64),
            b'C' => Value::Int(data.read_u8()? as i64),
            b's' => Value::Int(data.read_i16::<LittleEndian>()? as i64),
            b'S' => Value::Int(data.read_u16::<LittleEndian>()? as i64),
            b'i' => Value::Int(data.read_i32::<LittleEndian>()? as i64),
            b'I' => Value::Int(data.read_u32::<LittleEndian>()? as i64),
            b'f' => Value::Float(data.read_f32::<LittleEndian>()?),
            b'Z' => Value::String(read_c_string(data)?),
            b'H' => Value::Hex(read_c_string(data)?),
            b'B' => {
                let subtype = data.read_u8()?;
                let len = data.read_u32::<LittleEndian>()? as usize;
                let array = match subtype {
                    b'c' => Array::Int8(read_items(len, data, |d| d.read_i8())?),
                    b'C' => Array::UInt8(read_items(len, data, |d| d.read_u8())?),
                    b's' => Array::Int16(read_items(len, data, |d| d.read_i16::<LittleEndian>())?),
                    b'S' => Array::UInt16(read_items(len, data, |d| d.read_u16::<LittleEndian>())?),
                    b'i' => Array::Int32(read_items(len, data, |d| d.read_i32::<LittleEndian>())?),
                    b'I' => Array::UInt32(read_items(len, data, |d| d.read_u32::<LittleEndian>())?),
                    b'f' => Array::Float(read_items(len, data, |d| d.read_f32::<LittleEndian>())?),
                    other => return Err(invalid(format!("there is no array subtype <{}>", other as char))),
                };
                Value::Array(array)
            }
            other => return Err(invalid(format!("there is no tag type <{}>", other as char))),
        };
        Ok(value)
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn read_items<T>(
    len: usize,
    data: &mut &[u8],
    read: impl Fn(&mut &[u8]) -> io::Result<T>,
) -> io::Result<Vec<T>> {
    // Don't trust the declared length for the allocation.
    let mut items = Vec::with_capacity(len.min(data.len()));
    for _ in 0..len {
        items.push(read(data)?);
    }
    Ok(items)
}

fn read_c_string(data: &mut &[u8]) -> io::Result<String> {
    let bytes = *data;
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| invalid("string tag is not NUL-terminated".to_string()))?;
    let s = std::str::from_utf8(&bytes[..end])
        .map_err(|e| invalid(e.to_string()))?
        .to_string();
    *data = &bytes[end + 1..];
    Ok(s)
}

fn format_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    items.iter().try_for_each(|item| write!(f, ",{}", item))
}

/// Renders `T:value`, the part of a SAM field after the tag.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.sam_type())?;
        match self {
            Value::Character(c) => write!(f, "{}", *c as char),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) | Value::Hex(s) => f.write_str(s),
            Value::Array(array) => {
                write!(f, "{}", array.subtype() as char)?;
                match array {
                    Array::Int8(v) => format_list(f, v),
                    Array::UInt8(v) => format_list(f, v),
                    Array::Int16(v) => format_list(f, v),
                    Array::UInt16(v) => format_list(f, v),
                    Array::Int32(v) => format_list(f, v),
                    Array::UInt32(v) => format_list(f, v),
                    Array::Float(v) => format_list(f, v),
                }
            }
        }
    }
}

/// Ordered optional fields of one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data(Vec<(Tag, Value)>);

impl Data {
    pub fn new() -> Self {
        Data(Vec::new())
    }

    /// Appends a field; a tag may appear only once per record.
    pub fn push(&mut self, tag: Tag, value: Value) -> Result<(), String> {
        if self.get(&tag).is_some() {
            return Err(format!("duplicate tag {}", tag));
        }
        self.0.push((tag, value));
        Ok(())
    }

    pub fn get(&self, tag: &Tag) -> Option<&Value> {
        self.0.iter().find(|(t, _)| t == tag).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Tag, Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Size of the binary representation.
    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(|(_, v)| 2 + v.encoded_len()).sum()
    }

    pub fn encode(&self, dest: &mut Vec<u8>) -> Result<(), String> {
        for (tag, value) in &self.0 {
            dest.extend_from_slice(&tag.0);
            value.encode(dest).map_err(|e| format!("tag {}: {}", tag, e))?;
        }
        Ok(())
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Data, String> {
        let mut data = Data::new();
        while !bytes.is_empty() {
            if bytes.len() < 3 {
                return Err("truncated tag".to_string());
            }
            let tag = Tag([bytes[0], bytes[1]]);
            let ty = bytes[2];
            bytes = &bytes[3..];
            let value = Value::decode(ty, &mut bytes).map_err(|e| format!("tag {}: {}", tag, e))?;
            data.push(tag, value)?;
        }
        Ok(data)
    }
}

impl FromIterator<(Tag, Value)> for Data {
    fn from_iter<I: IntoIterator<Item = (Tag, Value)>>(iter: I) -> Self {
        Data(iter.into_iter().collect())
    }
}
