//! Type descriptors and the field resolver.
//!
//! A `TypeDescriptor` is the immutable, cacheable description of a value's SSZ shape.
//! Codec construction, size computation and merkleization all dispatch on it.
//! Containers are declared through a `ContainerSchema`, whose fields may carry the
//! `ssz-size`/`ssz-max` annotations that override the descriptor derived from a
//! field's natural shape.

use crate::error::Error;
use crate::value::{ContainerValue, PointerValue, SequenceValue, Value};
use crate::BYTES_PER_LENGTH_OFFSET;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// The SSZ shape of a value.
///
/// A `limit` of 0 means "unbounded at descriptor level": the caller supplies a
/// `max_capacity` at hashing time (or none, in which case the element count is used).
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    /// A fixed-length byte string of the given length.
    ByteVector(usize),
    /// A variable-length byte string.
    ByteList { limit: u64 },
    /// A fixed-length sequence of homogeneous elements.
    Vector {
        elem: Arc<TypeDescriptor>,
        len: usize,
    },
    /// A variable-length sequence of homogeneous elements.
    List {
        elem: Arc<TypeDescriptor>,
        limit: u64,
    },
    Container(Arc<ContainerSchema>),
    Pointer(PointerDescriptor),
    Bitlist { limit: u64 },
}

/// The referent of a pointer descriptor.
///
/// `Recursive` is a back-reference to an enclosing container, breaking the `Arc`
/// cycle a self-referential schema would otherwise need. Resolving a dangling
/// back-reference is the untyped-nil condition: the value no longer has a type.
#[derive(Debug, Clone)]
pub enum PointerDescriptor {
    Owned(Arc<TypeDescriptor>),
    Recursive(Weak<ContainerSchema>),
}

impl PointerDescriptor {
    pub fn owned(td: TypeDescriptor) -> Self {
        PointerDescriptor::Owned(Arc::new(td))
    }

    pub fn recursive(schema: &Weak<ContainerSchema>) -> Self {
        PointerDescriptor::Recursive(schema.clone())
    }

    /// Resolves the pointee's descriptor.
    pub fn pointee(&self) -> Result<TypeDescriptor, Error> {
        match self {
            PointerDescriptor::Owned(td) => Ok((**td).clone()),
            PointerDescriptor::Recursive(weak) => weak
                .upgrade()
                .map(TypeDescriptor::Container)
                .ok_or(Error::UntypedNil),
        }
    }
}

impl PartialEq for PointerDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PointerDescriptor::Owned(a), PointerDescriptor::Owned(b)) => a == b,
            (PointerDescriptor::Recursive(a), PointerDescriptor::Recursive(b)) => {
                Weak::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}

impl Eq for PointerDescriptor {}

impl Hash for PointerDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            PointerDescriptor::Owned(td) => {
                0u8.hash(state);
                td.hash(state);
            }
            PointerDescriptor::Recursive(weak) => {
                1u8.hash(state);
                match weak.upgrade() {
                    Some(schema) => schema.id().hash(state),
                    None => u64::MAX.hash(state),
                }
            }
        }
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        use TypeDescriptor::*;
        match (self, other) {
            (Bool, Bool) | (Uint8, Uint8) | (Uint16, Uint16) | (Uint32, Uint32)
            | (Uint64, Uint64) => true,
            (ByteVector(a), ByteVector(b)) => a == b,
            (ByteList { limit: a }, ByteList { limit: b }) => a == b,
            (
                Vector {
                    elem: ae,
                    len: al,
                },
                Vector {
                    elem: be,
                    len: bl,
                },
            ) => al == bl && ae == be,
            (
                List {
                    elem: ae,
                    limit: al,
                },
                List {
                    elem: be,
                    limit: bl,
                },
            ) => al == bl && ae == be,
            // Containers compare by schema identity: the stable handle that lets
            // cyclic descriptors resolve without deep recursion.
            (Container(a), Container(b)) => a.id() == b.id(),
            (Pointer(a), Pointer(b)) => a == b,
            (Bitlist { limit: a }, Bitlist { limit: b }) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            TypeDescriptor::Bool
            | TypeDescriptor::Uint8
            | TypeDescriptor::Uint16
            | TypeDescriptor::Uint32
            | TypeDescriptor::Uint64 => {}
            TypeDescriptor::ByteVector(len) => len.hash(state),
            TypeDescriptor::ByteList { limit } => limit.hash(state),
            TypeDescriptor::Vector { elem, len } => {
                elem.hash(state);
                len.hash(state);
            }
            TypeDescriptor::List { elem, limit } => {
                elem.hash(state);
                limit.hash(state);
            }
            TypeDescriptor::Container(schema) => schema.id().hash(state),
            TypeDescriptor::Pointer(p) => p.hash(state),
            TypeDescriptor::Bitlist { limit } => limit.hash(state),
        }
    }
}

impl TypeDescriptor {
    /// True iff this descriptor is a list, bitlist, or transitively contains one.
    pub fn is_variable_size(&self) -> bool {
        self.is_variable_inner(&mut SmallVec::new())
    }

    fn is_variable_inner(&self, visiting: &mut SmallVec<[u64; 4]>) -> bool {
        match self {
            TypeDescriptor::List { .. }
            | TypeDescriptor::ByteList { .. }
            | TypeDescriptor::Bitlist { .. } => true,
            TypeDescriptor::Bool
            | TypeDescriptor::Uint8
            | TypeDescriptor::Uint16
            | TypeDescriptor::Uint32
            | TypeDescriptor::Uint64
            | TypeDescriptor::ByteVector(_) => false,
            TypeDescriptor::Vector { elem, .. } => elem.is_variable_inner(visiting),
            TypeDescriptor::Container(schema) => schema_is_variable(schema, visiting),
            TypeDescriptor::Pointer(PointerDescriptor::Owned(td)) => {
                td.is_variable_inner(visiting)
            }
            TypeDescriptor::Pointer(PointerDescriptor::Recursive(weak)) => match weak.upgrade() {
                Some(schema) => schema_is_variable(&schema, visiting),
                None => false,
            },
        }
    }

    /// The fixed footprint of this descriptor in bytes: the serialized size for a
    /// fixed-size type, or the width of its fixed part (offset slots included) for a
    /// composite. Variable-size kinds occupy one offset slot.
    pub fn fixed_size(&self) -> u64 {
        self.fixed_size_inner(&mut SmallVec::new())
    }

    fn fixed_size_inner(&self, visiting: &mut SmallVec<[u64; 4]>) -> u64 {
        match self {
            TypeDescriptor::Bool | TypeDescriptor::Uint8 => 1,
            TypeDescriptor::Uint16 => 2,
            TypeDescriptor::Uint32 => 4,
            TypeDescriptor::Uint64 => 8,
            TypeDescriptor::ByteVector(len) => *len as u64,
            TypeDescriptor::List { .. }
            | TypeDescriptor::ByteList { .. }
            | TypeDescriptor::Bitlist { .. } => BYTES_PER_LENGTH_OFFSET as u64,
            TypeDescriptor::Vector { elem, len } => {
                let per_elem = if elem.is_variable_size() {
                    BYTES_PER_LENGTH_OFFSET as u64
                } else {
                    elem.fixed_size_inner(visiting)
                };
                *len as u64 * per_elem
            }
            TypeDescriptor::Container(schema) => schema_fixed_size(schema, visiting),
            TypeDescriptor::Pointer(PointerDescriptor::Owned(td)) => {
                td.fixed_size_inner(visiting)
            }
            TypeDescriptor::Pointer(PointerDescriptor::Recursive(weak)) => match weak.upgrade() {
                Some(schema) => schema_fixed_size(&schema, visiting),
                None => 0,
            },
        }
    }

    /// Materializes the zero value of this descriptor.
    pub fn zero_value(&self) -> Value {
        match self {
            TypeDescriptor::Bool => Value::Bool(false),
            TypeDescriptor::Uint8 => Value::Uint8(0),
            TypeDescriptor::Uint16 => Value::Uint16(0),
            TypeDescriptor::Uint32 => Value::Uint32(0),
            TypeDescriptor::Uint64 => Value::Uint64(0),
            TypeDescriptor::ByteVector(len) => Value::ByteVector(vec![0; *len]),
            TypeDescriptor::ByteList { .. } => Value::ByteList(vec![]),
            TypeDescriptor::Vector { elem, len } => Value::Vector(SequenceValue {
                elem: elem.clone(),
                items: (0..*len).map(|_| elem.zero_value()).collect(),
            }),
            TypeDescriptor::List { elem, .. } => Value::List(SequenceValue {
                elem: elem.clone(),
                items: vec![],
            }),
            TypeDescriptor::Container(schema) => Value::Container(ContainerValue {
                schema: schema.clone(),
                fields: schema
                    .fields()
                    .iter()
                    .map(|f| f.descriptor().zero_value())
                    .collect(),
            }),
            TypeDescriptor::Pointer(p) => Value::Pointer(PointerValue {
                referent: p.clone(),
                value: None,
            }),
            TypeDescriptor::Bitlist { .. } => Value::Bitlist(crate::value::Bitlist::empty()),
        }
    }
}

fn schema_is_variable(schema: &Arc<ContainerSchema>, visiting: &mut SmallVec<[u64; 4]>) -> bool {
    // A container mid-visit contributes nothing: only lists and bitlists on some
    // other path can make a recursive type variable.
    if visiting.contains(&schema.id()) {
        return false;
    }
    visiting.push(schema.id());
    let variable = schema
        .fields()
        .iter()
        .any(|f| f.descriptor().is_variable_inner(visiting));
    visiting.pop();
    variable
}

fn schema_fixed_size(schema: &Arc<ContainerSchema>, visiting: &mut SmallVec<[u64; 4]>) -> u64 {
    if visiting.contains(&schema.id()) {
        return 0;
    }
    visiting.push(schema.id());
    let total = schema
        .fields()
        .iter()
        .map(|f| {
            if f.descriptor().is_variable_size() {
                BYTES_PER_LENGTH_OFFSET as u64
            } else {
                f.descriptor().fixed_size_inner(visiting)
            }
        })
        .sum();
    visiting.pop();
    total
}

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(0);

/// An ordered set of named, typed fields describing a container.
///
/// Schemas carry a process-unique id; descriptors and cache keys compare containers by
/// that id rather than structurally, so a schema is its own identity.
#[derive(Debug)]
pub struct ContainerSchema {
    id: u64,
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl ContainerSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            fields,
        })
    }

    /// Builds a schema whose fields may refer back to the schema itself through
    /// `PointerDescriptor::recursive`.
    pub fn recursive(
        name: impl Into<String>,
        fields: impl FnOnce(&Weak<Self>) -> Vec<FieldDescriptor>,
    ) -> Arc<Self> {
        let id = NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        Arc::new_cyclic(|weak| Self {
            id,
            name,
            fields: fields(weak),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// The zero value of this container.
    pub fn zero_value(self: &Arc<Self>) -> Value {
        TypeDescriptor::Container(self.clone()).zero_value()
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for ContainerSchema {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ContainerSchema {}

impl Hash for ContainerSchema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One dimension of an `ssz-size` annotation: a fixed length, or `?` for variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeHint {
    Fixed(u64),
    Variable,
}

/// A container field: name, annotation-applied descriptor, and the `ssz-max` capacity
/// used when hashing (0 = absent).
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    td: TypeDescriptor,
    capacity: u64,
    size_hints: Vec<SizeHint>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, td: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            td,
            capacity: 0,
            size_hints: vec![],
        }
    }

    /// Builds a field whose descriptor is overridden by ssz annotations, e.g.
    ///
    /// ```text
    /// ssz-size:"?,32" ssz-max:"100"
    /// ```
    ///
    /// turns a list-of-byte-list field into a list of 32-byte vectors bounded by 100
    /// elements.
    pub fn tagged(
        name: impl Into<String>,
        td: TypeDescriptor,
        tags: &str,
    ) -> Result<Self, Error> {
        let tags = FieldTags::parse(tags)?;
        let td = apply_size_hints(&td, &tags.size)?;
        Ok(Self {
            name: name.into(),
            td,
            capacity: tags.max.unwrap_or(0),
            size_hints: tags.size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.td
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn size_hints(&self) -> &[SizeHint] {
        &self.size_hints
    }
}

struct FieldTags {
    size: Vec<SizeHint>,
    max: Option<u64>,
}

impl FieldTags {
    fn parse(input: &str) -> Result<Self, Error> {
        let mut tags = FieldTags {
            size: vec![],
            max: None,
        };
        for token in input.split_whitespace() {
            let (key, rest) = token.split_once(':').ok_or_else(|| {
                Error::UnsupportedType(format!("malformed ssz tag: {}", token))
            })?;
            let value = rest
                .strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .ok_or_else(|| {
                    Error::UnsupportedType(format!("ssz tag value must be quoted: {}", token))
                })?;
            match key {
                "ssz-size" => {
                    for dim in value.split(',') {
                        if dim == "?" {
                            tags.size.push(SizeHint::Variable);
                        } else {
                            let n = dim.parse().map_err(|_| {
                                Error::UnsupportedType(format!(
                                    "invalid ssz-size dimension: {}",
                                    dim
                                ))
                            })?;
                            tags.size.push(SizeHint::Fixed(n));
                        }
                    }
                }
                "ssz-max" => {
                    tags.max = Some(value.parse().map_err(|_| {
                        Error::UnsupportedType(format!("invalid ssz-max value: {}", value))
                    })?);
                }
                other => {
                    return Err(Error::UnsupportedType(format!(
                        "unknown ssz tag key: {}",
                        other
                    )))
                }
            }
        }
        Ok(tags)
    }
}

/// Rewrites a descriptor according to `ssz-size` hints, outermost dimension first.
///
/// A `Fixed(n)` hint pins a variable dimension: byte-list becomes byte-vector(n),
/// list becomes vector(n). `?` leaves the dimension variable.
pub fn apply_size_hints(
    td: &TypeDescriptor,
    hints: &[SizeHint],
) -> Result<TypeDescriptor, Error> {
    let (first, rest) = match hints.split_first() {
        Some(split) => split,
        None => return Ok(td.clone()),
    };
    match (td, first) {
        (TypeDescriptor::ByteList { limit }, SizeHint::Variable) if rest.is_empty() => {
            Ok(TypeDescriptor::ByteList { limit: *limit })
        }
        (TypeDescriptor::ByteList { .. }, SizeHint::Fixed(n)) if rest.is_empty() => {
            Ok(TypeDescriptor::ByteVector(*n as usize))
        }
        (TypeDescriptor::ByteVector(_), SizeHint::Fixed(n)) if rest.is_empty() => {
            Ok(TypeDescriptor::ByteVector(*n as usize))
        }
        (TypeDescriptor::List { elem, limit }, SizeHint::Variable) => Ok(TypeDescriptor::List {
            elem: Arc::new(apply_size_hints(elem, rest)?),
            limit: *limit,
        }),
        (TypeDescriptor::List { elem, .. }, SizeHint::Fixed(n)) => Ok(TypeDescriptor::Vector {
            elem: Arc::new(apply_size_hints(elem, rest)?),
            len: *n as usize,
        }),
        (TypeDescriptor::Vector { elem, .. }, SizeHint::Fixed(n)) => Ok(TypeDescriptor::Vector {
            elem: Arc::new(apply_size_hints(elem, rest)?),
            len: *n as usize,
        }),
        _ => Err(Error::UnsupportedType(format!(
            "ssz-size does not apply to {:?}",
            td
        ))),
    }
}

/// Maps a value's shape to its type descriptor.
///
/// Signed 32-bit values describe as `Uint32`: they decode identically to the unsigned
/// kind, while encoders reject the signed value itself.
pub fn describe(value: &Value) -> TypeDescriptor {
    match value {
        Value::Bool(_) => TypeDescriptor::Bool,
        Value::Uint8(_) => TypeDescriptor::Uint8,
        Value::Uint16(_) => TypeDescriptor::Uint16,
        Value::Uint32(_) | Value::Int32(_) => TypeDescriptor::Uint32,
        Value::Uint64(_) => TypeDescriptor::Uint64,
        Value::ByteVector(bytes) => TypeDescriptor::ByteVector(bytes.len()),
        Value::ByteList(_) => TypeDescriptor::ByteList { limit: 0 },
        Value::Vector(seq) => TypeDescriptor::Vector {
            elem: seq.elem.clone(),
            len: seq.items.len(),
        },
        Value::List(seq) => TypeDescriptor::List {
            elem: seq.elem.clone(),
            limit: 0,
        },
        Value::Container(c) => TypeDescriptor::Container(c.schema.clone()),
        Value::Pointer(p) => TypeDescriptor::Pointer(p.referent.clone()),
        Value::Bitlist(_) => TypeDescriptor::Bitlist { limit: 0 },
    }
}

/// True iff `value`'s shape can be decoded into under `td` without reshaping.
pub(crate) fn conforms(value: &Value, td: &TypeDescriptor) -> bool {
    match (value, td) {
        (Value::Bool(_), TypeDescriptor::Bool)
        | (Value::Uint8(_), TypeDescriptor::Uint8)
        | (Value::Uint16(_), TypeDescriptor::Uint16)
        | (Value::Uint32(_), TypeDescriptor::Uint32)
        | (Value::Int32(_), TypeDescriptor::Uint32)
        | (Value::Uint64(_), TypeDescriptor::Uint64)
        | (Value::ByteList(_), TypeDescriptor::ByteList { .. })
        | (Value::Bitlist(_), TypeDescriptor::Bitlist { .. }) => true,
        (Value::ByteVector(bytes), TypeDescriptor::ByteVector(len)) => bytes.len() == *len,
        (Value::Vector(seq), TypeDescriptor::Vector { elem, len }) => {
            seq.items.len() == *len && *seq.elem == **elem
        }
        (Value::List(seq), TypeDescriptor::List { elem, .. }) => *seq.elem == **elem,
        (Value::Container(c), TypeDescriptor::Container(schema)) => c.schema.id() == schema.id(),
        (Value::Pointer(p), TypeDescriptor::Pointer(pd)) => p.referent == *pd,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_list() -> TypeDescriptor {
        TypeDescriptor::ByteList { limit: 0 }
    }

    #[test]
    fn parse_size_and_max_tags() {
        let base = TypeDescriptor::List {
            elem: Arc::new(byte_list()),
            limit: 0,
        };
        let field =
            FieldDescriptor::tagged("roots", base, r#"ssz-size:"?,32" ssz-max:"2""#).unwrap();
        assert_eq!(field.capacity(), 2);
        match field.descriptor() {
            TypeDescriptor::List { elem, .. } => {
                assert_eq!(**elem, TypeDescriptor::ByteVector(32))
            }
            other => panic!("unexpected descriptor: {:?}", other),
        }
    }

    #[test]
    fn size_tag_pins_both_dimensions() {
        let base = TypeDescriptor::List {
            elem: Arc::new(byte_list()),
            limit: 0,
        };
        let field = FieldDescriptor::tagged("roots", base, r#"ssz-size:"2,32""#).unwrap();
        match field.descriptor() {
            TypeDescriptor::Vector { elem, len } => {
                assert_eq!(*len, 2);
                assert_eq!(**elem, TypeDescriptor::ByteVector(32));
            }
            other => panic!("unexpected descriptor: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_tag_keys() {
        assert!(matches!(
            FieldDescriptor::tagged("x", byte_list(), r#"ssz-wat:"1""#),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn variable_size_rules() {
        assert!(!TypeDescriptor::Uint64.is_variable_size());
        assert!(!TypeDescriptor::ByteVector(32).is_variable_size());
        assert!(byte_list().is_variable_size());
        assert!(TypeDescriptor::Bitlist { limit: 0 }.is_variable_size());

        let vector_of_lists = TypeDescriptor::Vector {
            elem: Arc::new(byte_list()),
            len: 4,
        };
        assert!(vector_of_lists.is_variable_size());

        let schema = ContainerSchema::new(
            "Fixed",
            vec![
                FieldDescriptor::new("a", TypeDescriptor::Uint64),
                FieldDescriptor::new("b", TypeDescriptor::Bool),
            ],
        );
        assert!(!TypeDescriptor::Container(schema).is_variable_size());
    }

    #[test]
    fn container_fixed_size_counts_offset_slots() {
        let schema = ContainerSchema::new(
            "Sample",
            vec![
                FieldDescriptor::new("slot", TypeDescriptor::Uint64),
                FieldDescriptor::new("is_new", TypeDescriptor::Bool),
                FieldDescriptor::new("root", byte_list()),
            ],
        );
        let td = TypeDescriptor::Container(schema);
        assert!(td.is_variable_size());
        assert_eq!(td.fixed_size(), 8 + 1 + 4);
    }

    #[test]
    fn recursive_schema_terminates() {
        let node = ContainerSchema::recursive("Node", |this| {
            vec![
                FieldDescriptor::new("value", TypeDescriptor::Uint64),
                FieldDescriptor::new(
                    "next",
                    TypeDescriptor::Pointer(PointerDescriptor::recursive(this)),
                ),
            ]
        });
        let td = TypeDescriptor::Container(node);
        assert!(!td.is_variable_size());
        assert_eq!(td.fixed_size(), 8);
    }

    #[test]
    fn describe_round_trips_zero_values() {
        let schema = ContainerSchema::new(
            "Sample",
            vec![
                FieldDescriptor::new("slot", TypeDescriptor::Uint64),
                FieldDescriptor::new("root", byte_list()),
            ],
        );
        let td = TypeDescriptor::Container(schema);
        let zero = td.zero_value();
        assert_eq!(describe(&zero), td);
        assert!(conforms(&zero, &td));
    }

    #[test]
    fn dangling_recursive_pointer_is_untyped() {
        let weak = {
            let schema = ContainerSchema::new("Gone", vec![]);
            Arc::downgrade(&schema)
        };
        let pd = PointerDescriptor::Recursive(weak);
        assert_eq!(pd.pointee(), Err(Error::UntypedNil));
    }
}
