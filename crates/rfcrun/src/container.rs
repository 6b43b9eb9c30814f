//! # Data Containers
//!
//! Generic typed access to the fields of an engine-held container: a
//! function-call instance, a structure, or a table.
//!
//! A container resolves a field name against its descriptor, dispatches
//! on the field's remote type, and performs the correctly shaped engine
//! read or write. The dispatch is one exhaustive match per direction, so
//! no type code can go silently unhandled.
//!
//! ## Ownership
//!
//! Each wrapper owns exactly one engine container, released when the
//! wrapper is dropped. Nested views (structures and tables read out of a
//! parent) do not own their handle; they keep the parent core alive
//! instead, so a child can never outlive the storage it points into.

use std::sync::Arc;

use widestring::U16String;

use rfcwire::ErrorInfo;
use rfcwire::FieldDesc;
use rfcwire::FunctionDesc;
use rfcwire::Result;
use rfcwire::RfcError;
use rfcwire::RfcType;
use rfcwire::TypeDesc;

use crate::engine::ContainerHandle;
use crate::engine::RfcEngine;
use crate::table::Table;
use crate::value::to_date_field;
use crate::value::to_decimal_text;
use crate::value::to_time_field;
use crate::value::Value;

/// Descriptor access for the two container layouts.
#[derive(Debug, Clone)]
pub(crate) enum Shape {
    /// A function-call instance described by parameters.
    Function(Arc<FunctionDesc>),
    /// A structure or table row described by fields.
    Fields(Arc<TypeDesc>),
}

impl Shape {
    fn lookup(&self, upper: &str) -> Option<&FieldDesc> {
        match self {
            Shape::Function(desc) => desc.parameter(upper),
            Shape::Fields(desc) => desc.field(upper),
        }
    }

    fn names(&self) -> Vec<String> {
        match self {
            Shape::Function(desc) => desc.parameter_names(),
            Shape::Fields(desc) => desc.field_names(),
        }
    }
}

/// The shared core behind every container wrapper.
pub struct ContainerCore {
    engine: Arc<dyn RfcEngine>,
    handle: ContainerHandle,
    shape: Shape,
    owned: bool,
    // Keeps the parent's engine-side storage alive for nested views.
    _parent: Option<Arc<ContainerCore>>,
}

impl std::fmt::Debug for ContainerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerCore")
            .field("handle", &self.handle)
            .field("owned", &self.owned)
            .finish()
    }
}

impl Drop for ContainerCore {
    fn drop(&mut self) {
        if self.owned {
            let _ = self.engine.destroy_container(self.handle);
        }
    }
}

impl ContainerCore {
    /// A core that owns its engine container.
    pub(crate) fn owned(engine: Arc<dyn RfcEngine>, handle: ContainerHandle, shape: Shape) -> Arc<Self> {
        Arc::new(Self { engine, handle, shape, owned: true, _parent: None })
    }

    /// A core for an engine-owned container (an inbound server call).
    pub(crate) fn borrowed(engine: Arc<dyn RfcEngine>, handle: ContainerHandle, shape: Shape) -> Arc<Self> {
        Arc::new(Self { engine, handle, shape, owned: false, _parent: None })
    }

    /// A view into storage owned by `parent`.
    pub(crate) fn view(parent: &Arc<Self>, handle: ContainerHandle, shape: Shape) -> Arc<Self> {
        Arc::new(Self {
            engine: parent.engine.clone(),
            handle,
            shape,
            owned: false,
            _parent: Some(parent.clone()),
        })
    }

    pub(crate) fn engine(&self) -> &Arc<dyn RfcEngine> {
        &self.engine
    }

    pub(crate) fn handle(&self) -> ContainerHandle {
        self.handle
    }

    pub(crate) fn shape(&self) -> Shape {
        self.shape.clone()
    }

    pub(crate) fn describe(&self, name: &str) -> Result<FieldDesc> {
        let upper = name.to_uppercase();
        self.shape
            .lookup(&upper)
            .cloned()
            .ok_or_else(|| RfcError::Engine(ErrorInfo::not_found(format!("field {}", upper))))
    }

    pub(crate) fn field_names(&self) -> Vec<String> {
        self.shape.names()
    }

    fn nested_shape(desc: &FieldDesc) -> Result<Shape> {
        let nested = desc.nested.as_ref().ok_or_else(|| {
            RfcError::Engine(ErrorInfo::invalid_parameter(format!(
                "field {} has no nested type description",
                desc.name
            )))
        })?;
        Ok(Shape::Fields(nested.clone()))
    }

    fn decode_wide(field: &str, wide: U16String) -> Result<String> {
        wide.to_string().map_err(|_| {
            RfcError::Engine(ErrorInfo::conversion_failure(format!(
                "field {} holds invalid wide text",
                field
            )))
        })
    }

    /// Reads a field, dispatching on its remote type.
    pub(crate) fn get(core: &Arc<Self>, name: &str) -> Result<Value> {
        let desc = core.describe(name)?;
        let field = desc.name.as_str();
        let engine = &core.engine;
        let handle = core.handle;

        match desc.ty {
            RfcType::Char => {
                let text = Self::decode_wide(field, engine.get_chars(handle, field)?)?;
                Ok(Value::Chars(text.trim_end_matches(' ').to_string()))
            }
            RfcType::Date => {
                let wire = engine.get_date(handle, field)?;
                let text = Self::decode_wide(field, U16String::from_vec(wire.to_vec()))?;
                let date = chrono::NaiveDate::parse_from_str(&text, "%Y%m%d").map_err(|_| {
                    RfcError::Engine(ErrorInfo::conversion_failure(format!(
                        "field {} holds no valid date: {:?}",
                        field, text
                    )))
                })?;
                Ok(Value::Date(date))
            }
            RfcType::Bcd => {
                let text = Self::decode_wide(field, engine.get_chars(handle, field)?)?;
                let parsed = text.trim().parse::<f64>().map_err(|_| {
                    RfcError::Engine(ErrorInfo::conversion_failure(format!(
                        "field {} holds no valid decimal: {:?}",
                        field, text
                    )))
                })?;
                Ok(Value::Bcd(parsed))
            }
            RfcType::Time => {
                let wire = engine.get_time(handle, field)?;
                let text = Self::decode_wide(field, U16String::from_vec(wire.to_vec()))?;
                let time = chrono::NaiveTime::parse_from_str(&text, "%H%M%S").map_err(|_| {
                    RfcError::Engine(ErrorInfo::conversion_failure(format!(
                        "field {} holds no valid time: {:?}",
                        field, text
                    )))
                })?;
                Ok(Value::Time(time))
            }
            RfcType::Byte => Ok(Value::Bytes(engine.get_bytes(handle, field)?)),
            RfcType::Table => {
                let child = engine.get_table(handle, field)?;
                let shape = Self::nested_shape(&desc)?;
                Ok(Value::Table(Table::from_core(Self::view(core, child, shape))))
            }
            RfcType::Num => {
                let text = Self::decode_wide(field, engine.get_num(handle, field)?)?;
                Ok(Value::Num(text.trim_end_matches(' ').to_string()))
            }
            RfcType::Float => Ok(Value::Float(engine.get_float(handle, field)?)),
            RfcType::Int => Ok(Value::Int(engine.get_int(handle, field)?)),
            RfcType::Int2 => Ok(Value::Int2(engine.get_int2(handle, field)?)),
            RfcType::Int1 => Ok(Value::Int1(engine.get_int1(handle, field)?)),
            RfcType::Null => Err(RfcError::Unsupported {
                field: desc.name.clone(),
                ty: desc.ty,
                op: "read",
            }),
            RfcType::Structure => {
                let child = engine.get_structure(handle, field)?;
                let shape = Self::nested_shape(&desc)?;
                Ok(Value::Structure(Structure::from_core(Self::view(core, child, shape))))
            }
            RfcType::Decf16 => Ok(Value::Decf(engine.get_decf16(handle, field)?)),
            RfcType::Decf34 => Ok(Value::Decf(engine.get_decf34(handle, field)?)),
            RfcType::XmlData => Err(RfcError::Unsupported {
                field: desc.name.clone(),
                ty: desc.ty,
                op: "read",
            }),
            RfcType::String => {
                let length = engine.string_length(handle, field)?;
                let wide = engine.get_string(handle, field, length + 1)?;
                Ok(Value::Str(Self::decode_wide(field, wide)?))
            }
            RfcType::XString => {
                let length = engine.x_string_length(handle, field)?;
                Ok(Value::XStr(engine.get_x_string(handle, field, length)?))
            }
        }
    }

    /// Writes a field, dispatching on its remote type.
    pub(crate) fn set(core: &Arc<Self>, name: &str, value: Value) -> Result<()> {
        let desc = core.describe(name)?;
        let field = desc.name.as_str();
        let engine = &core.engine;
        let handle = core.handle;

        let mismatch = |found: &Value| RfcError::ValueMismatch {
            field: desc.name.clone(),
            expected: desc.ty,
            found: found.kind(),
        };

        match desc.ty {
            RfcType::Char => {
                let text = value.as_text().ok_or_else(|| mismatch(&value))?;
                let units: Vec<u16> = text.encode_utf16().collect();
                engine.set_chars(handle, field, &units)?;
            }
            RfcType::Date => {
                let wire = to_date_field(field, &value)?;
                engine.set_date(handle, field, &wire)?;
            }
            RfcType::Bcd => {
                // Packed decimals travel as decimal text.
                let text = to_decimal_text(field, &value)?;
                let units: Vec<u16> = text.encode_utf16().collect();
                engine.set_string(handle, field, &units)?;
            }
            RfcType::Time => {
                let wire = to_time_field(field, &value)?;
                engine.set_time(handle, field, &wire)?;
            }
            RfcType::Byte => {
                let bytes = value.as_bytes().ok_or_else(|| mismatch(&value))?;
                engine.set_bytes(handle, field, bytes)?;
            }
            RfcType::Table => match value {
                Value::Table(ref table) => {
                    engine.set_table(handle, field, table.handle())?;
                }
                other => return Err(mismatch(&other)),
            },
            RfcType::Num => {
                let text = value.as_text().ok_or_else(|| mismatch(&value))?;
                let units: Vec<u16> = text.encode_utf16().collect();
                engine.set_num(handle, field, &units)?;
            }
            RfcType::Float => match value {
                Value::Float(v) | Value::Bcd(v) => engine.set_float(handle, field, v)?,
                ref other => match other.as_integer() {
                    Some(v) => engine.set_float(handle, field, v as f64)?,
                    None => return Err(mismatch(other)),
                },
            },
            RfcType::Int => {
                let v = value.as_integer().ok_or_else(|| mismatch(&value))?;
                engine.set_int(handle, field, v as i32)?;
            }
            RfcType::Int2 => {
                let v = value.as_integer().ok_or_else(|| mismatch(&value))?;
                engine.set_int2(handle, field, v as i16)?;
            }
            RfcType::Int1 => {
                let v = value.as_integer().ok_or_else(|| mismatch(&value))?;
                engine.set_int1(handle, field, v as u8)?;
            }
            RfcType::Null => {
                return Err(RfcError::Unsupported { field: desc.name.clone(), ty: desc.ty, op: "write" });
            }
            RfcType::Structure => match value {
                Value::Structure(ref structure) => {
                    engine.set_structure(handle, field, structure.handle())?;
                }
                other => return Err(mismatch(&other)),
            },
            // Decimal-float writes would silently lose precision through
            // the f64 approximation, so they fail fast instead.
            RfcType::Decf16 | RfcType::Decf34 => {
                return Err(RfcError::Unsupported { field: desc.name.clone(), ty: desc.ty, op: "write" });
            }
            RfcType::XmlData => {
                return Err(RfcError::Unsupported { field: desc.name.clone(), ty: desc.ty, op: "write" });
            }
            RfcType::String => {
                let text = value.as_text().ok_or_else(|| mismatch(&value))?;
                let units: Vec<u16> = text.encode_utf16().collect();
                engine.set_string(handle, field, &units)?;
            }
            RfcType::XString => {
                let bytes = value.as_bytes().ok_or_else(|| mismatch(&value))?;
                engine.set_x_string(handle, field, bytes)?;
            }
        }
        Ok(())
    }
}

/// Named-field access shared by function calls, structures, and tables.
pub trait DataContainer {
    /// The shared core of this container.
    #[doc(hidden)]
    fn core(&self) -> &Arc<ContainerCore>;

    /// Reads the field with the given (case-insensitive) name.
    fn get(&self, name: &str) -> Result<Value> {
        ContainerCore::get(self.core(), name)
    }

    /// Writes the field with the given (case-insensitive) name.
    fn set<V: Into<Value>>(&self, name: &str, value: V) -> Result<()>
    where
        Self: Sized,
    {
        ContainerCore::set(self.core(), name, value.into())
    }

    /// Field names in declaration order.
    fn fields(&self) -> Vec<String> {
        self.core().field_names()
    }

    /// The descriptor of one field.
    fn describe(&self, name: &str) -> Result<FieldDesc> {
        self.core().describe(name)
    }
}

/// A composite value with named fields and no cursor.
///
/// Structures are obtained from structure-typed fields of a parent
/// container and from table rows; they are views into the parent's
/// storage.
#[derive(Debug, Clone)]
pub struct Structure {
    core: Arc<ContainerCore>,
}

impl Structure {
    pub(crate) fn from_core(core: Arc<ContainerCore>) -> Self {
        Self { core }
    }

    pub(crate) fn handle(&self) -> ContainerHandle {
        self.core.handle()
    }
}

impl DataContainer for Structure {
    fn core(&self) -> &Arc<ContainerCore> {
        &self.core
    }
}
