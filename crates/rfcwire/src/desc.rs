//! Read-only shape metadata: field, structure, and function descriptors.
//!
//! Descriptors are plain values. Once built they are never mutated; call
//! instances share them through `Arc`. Field and parameter names are
//! normalized to uppercase at construction so that every lookup is
//! case-insensitive.

use std::sync::Arc;

use crate::error::Result;
use crate::error::RfcError;
use crate::types::Direction;
use crate::types::RfcType;

/// Shape of one field or parameter.
///
/// `nuc_length`/`uc_length` are the native and unicode wire widths;
/// `direction` is set only on function parameters; `nested` points at the
/// row/field layout of composite types.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    pub name: String,
    pub ty: RfcType,
    pub direction: Option<Direction>,
    pub nuc_length: u32,
    pub uc_length: u32,
    pub decimals: u32,
    pub optional: bool,
    pub nested: Option<Arc<TypeDesc>>,
    pub default_value: Option<String>,
    pub text: Option<String>,
}

/// Named, ordered field layout of a structure or table row.
#[derive(Debug, Clone)]
pub struct TypeDesc {
    name: String,
    fields: Vec<FieldDesc>,
}

impl TypeDesc {
    /// Builds a layout from the given fields, normalizing field names.
    pub fn new(name: impl Into<String>, mut fields: Vec<FieldDesc>) -> Self {
        for field in &mut fields {
            field.name = field.name.to_uppercase();
        }
        Self { name: name.into().to_uppercase(), fields }
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a field by case-insensitive name.
    pub fn field(&self, name: &str) -> Option<&FieldDesc> {
        let upper = name.to_uppercase();
        self.fields.iter().find(|f| f.name == upper)
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the layout has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over the fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDesc> {
        self.fields.iter()
    }
}

/// Named, ordered parameter list of one remote-callable function.
#[derive(Debug, Clone)]
pub struct FunctionDesc {
    name: String,
    params: Vec<FieldDesc>,
}

impl FunctionDesc {
    /// Builds a descriptor from the given parameters, normalizing names.
    pub fn new(name: impl Into<String>, mut params: Vec<FieldDesc>) -> Self {
        for param in &mut params {
            param.name = param.name.to_uppercase();
        }
        Self { name: name.into().to_uppercase(), params }
    }

    /// The function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a parameter by case-insensitive name.
    pub fn parameter(&self, name: &str) -> Option<&FieldDesc> {
        let upper = name.to_uppercase();
        self.params.iter().find(|p| p.name == upper)
    }

    /// Parameter names in declaration order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Number of parameters.
    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    /// Iterates over the parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDesc> {
        self.params.iter()
    }
}

/// Validated builder for one parameter or field definition.
///
/// Replaces free-form construction with named fields checked at build
/// time: packed and decimal-float types must carry an explicit length,
/// intrinsically sized types must not, composites must name their row
/// layout, and the sentinel types are rejected outright.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    ty: RfcType,
    direction: Option<Direction>,
    length: Option<u32>,
    decimals: u32,
    optional: bool,
    nested: Option<Arc<TypeDesc>>,
    default_value: Option<String>,
    text: Option<String>,
}

impl Parameter {
    /// Starts a definition with the given name and type.
    pub fn new(name: impl Into<String>, ty: RfcType) -> Self {
        Self {
            name: name.into(),
            ty,
            direction: None,
            length: None,
            decimals: 0,
            optional: false,
            nested: None,
            default_value: None,
            text: None,
        }
    }

    /// Sets the transfer direction (function parameters only).
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Sets the field width for types without an intrinsic width.
    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the decimal count of a packed value.
    pub fn decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }

    /// Marks the parameter optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets the row/field layout of a composite type.
    pub fn nested(mut self, nested: Arc<TypeDesc>) -> Self {
        self.nested = Some(nested);
        self
    }

    /// Sets the default value text.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Sets the descriptive parameter text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Validates the definition and produces the descriptor record.
    ///
    /// # Errors
    ///
    /// Returns `RfcError::InvalidParameter` when the definition is
    /// inconsistent: a missing length where one is required, a length on
    /// an intrinsically sized type, a composite without a nested layout,
    /// or a type that can never be transferred.
    pub fn build(self) -> Result<FieldDesc> {
        let name = self.name.to_uppercase();
        if name.is_empty() {
            return Err(RfcError::InvalidParameter("parameter name must not be empty".into()));
        }

        let nuc_length = match self.ty {
            RfcType::Null | RfcType::XmlData => {
                return Err(RfcError::InvalidParameter(format!(
                    "{} is not a transferable type",
                    self.ty
                )));
            }
            RfcType::Table | RfcType::Structure => {
                if self.nested.is_none() {
                    return Err(RfcError::InvalidParameter(format!(
                        "{} parameter {} needs a nested type description",
                        self.ty, name
                    )));
                }
                0
            }
            RfcType::String | RfcType::XString => self.length.unwrap_or(0),
            ty if ty.needs_length() => self.length.ok_or_else(|| {
                RfcError::InvalidParameter(format!(
                    "{} parameter {} requires an explicit length",
                    ty, name
                ))
            })?,
            ty => {
                let width = ty.fixed_width().unwrap_or(0);
                match self.length {
                    Some(given) if given != width => {
                        return Err(RfcError::InvalidParameter(format!(
                            "{} parameter {} has intrinsic width {}, not {}",
                            ty, name, width, given
                        )));
                    }
                    _ => width,
                }
            }
        };

        // Character-like data doubles in width on unicode systems; binary
        // and variable-length data does not.
        let uc_length = match self.ty {
            RfcType::Char | RfcType::Num | RfcType::Date | RfcType::Time | RfcType::Bcd => {
                nuc_length * 2
            }
            _ => nuc_length,
        };

        Ok(FieldDesc {
            name,
            ty: self.ty,
            direction: self.direction,
            nuc_length,
            uc_length,
            decimals: self.decimals,
            optional: self.optional,
            nested: self.nested,
            default_value: self.default_value,
            text: self.text,
        })
    }
}
