//! Fixed-size particle record layout.
//!
//! A record is an opaque run of bytes whose layout is decided once, when the
//! swarm is constructed. Two fields are always present: `coord` (one `f64` per
//! spatial dimension) and `owning_cell` (a `u32` cell index). Anything else a
//! simulation wants to carry per particle (velocity, material id, ...) is
//! registered as a named extension field and resolved to a byte offset here.
//! The store only ever needs the total record size and byte copies.

use crate::error::{Result, SwarmError};

/// Name of the mandatory coordinate field.
pub const COORD_FIELD: &str = "coord";
/// Name of the mandatory owning-cell field.
pub const OWNING_CELL_FIELD: &str = "owning_cell";

/// Scalar type of a record field component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 64-bit float
    F64,
    /// 32-bit float
    F32,
    /// 32-bit unsigned, also used for cell indices
    U32,
    /// 32-bit signed
    I32,
    /// 64-bit unsigned
    U64,
}

impl FieldKind {
    /// Size in bytes of one component.
    pub fn size(self) -> usize {
        match self {
            FieldKind::F64 | FieldKind::U64 => 8,
            FieldKind::F32 | FieldKind::U32 | FieldKind::I32 => 4,
        }
    }
}

/// A named field resolved to a byte offset within the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name, unique within the schema
    pub name: String,
    /// Component scalar type
    pub kind: FieldKind,
    /// Number of components (3 for a velocity vector, 1 for a scalar)
    pub components: usize,
    /// Byte offset of the first component
    pub offset: usize,
}

impl FieldSpec {
    /// Total bytes occupied by the field.
    pub fn byte_len(&self) -> usize {
        self.kind.size() * self.components
    }

    /// Byte offset of component `component`, or `None` past the last one.
    pub fn component_offset(&self, component: usize) -> Option<usize> {
        (component < self.components).then(|| self.offset + component * self.kind.size())
    }
}

/// Record layout shared by every particle in a swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    dim: usize,
    fields: Vec<FieldSpec>,
    size: usize,
}

impl RecordSchema {
    /// Layout with only the mandatory fields, for a 2D or 3D domain.
    pub fn new(dim: usize) -> Result<Self> {
        if dim != 2 && dim != 3 {
            return Err(SwarmError::InvalidConfig(format!(
                "record dimension must be 2 or 3, got {dim}"
            )));
        }
        let mut schema = Self {
            dim,
            fields: Vec::new(),
            size: 0,
        };
        schema.push_field(COORD_FIELD, FieldKind::F64, dim);
        schema.push_field(OWNING_CELL_FIELD, FieldKind::U32, 1);
        Ok(schema)
    }

    /// Register an extension field. Offsets are aligned to the component size.
    pub fn with_field(mut self, name: &str, kind: FieldKind, components: usize) -> Result<Self> {
        if components == 0 {
            return Err(SwarmError::InvalidConfig(format!(
                "field '{name}' must have at least one component"
            )));
        }
        if self.field(name).is_some() {
            return Err(SwarmError::InvalidConfig(format!(
                "field '{name}' is already registered"
            )));
        }
        self.push_field(name, kind, components);
        Ok(self)
    }

    fn push_field(&mut self, name: &str, kind: FieldKind, components: usize) {
        let align = kind.size();
        let offset = self.size.div_ceil(align) * align;
        let spec = FieldSpec {
            name: name.to_string(),
            kind,
            components,
            offset,
        };
        self.size = offset + spec.byte_len();
        self.fields.push(spec);
    }

    /// Spatial dimension (2 or 3).
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Size in bytes of one record, padded to 8-byte alignment.
    pub fn record_size(&self) -> usize {
        self.size.div_ceil(8) * 8
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by name, failing if it was never registered.
    pub fn require_field(&self, name: &str) -> Result<&FieldSpec> {
        self.field(name)
            .ok_or_else(|| SwarmError::InvalidConfig(format!("unknown record field '{name}'")))
    }

    /// All fields in registration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Byte offset of the coordinate field.
    pub fn coord_offset(&self) -> usize {
        self.fields[0].offset
    }

    /// Byte offset of the owning-cell field.
    pub fn owning_cell_offset(&self) -> usize {
        self.fields[1].offset
    }
}
