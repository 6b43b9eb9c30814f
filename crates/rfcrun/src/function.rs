//! Function descriptors in use: remote-fetched or locally declared, and
//! the call instances made from them.

use std::sync::Arc;

use rfcwire::FieldDesc;
use rfcwire::FunctionDesc;
use rfcwire::Parameter;
use rfcwire::Result;
use rfcwire::RfcError;

use crate::container::ContainerCore;
use crate::container::DataContainer;
use crate::container::Shape;
use crate::engine::ConnHandle;
use crate::engine::ContainerHandle;
use crate::engine::RfcEngine;
use crate::transaction::Transaction;

#[derive(Clone)]
enum Binding {
    /// Descriptor fetched from the remote system over a session.
    Fetched { conn: ConnHandle, desc: Arc<FunctionDesc> },
    /// Descriptor assembled locally, parameter by parameter.
    Local { params: Vec<FieldDesc> },
}

/// One remote-callable function module.
///
/// A function is either *fetched* — its descriptor retrieved from the
/// remote system through [`Connection::function`] — or *local*, built up
/// with [`Function::add_parameter`] to declare a signature this process
/// will host or marshal against without a session.
///
/// [`Connection::function`]: crate::connection::Connection::function
#[derive(Clone)]
pub struct Function {
    engine: Arc<dyn RfcEngine>,
    name: String,
    binding: Binding,
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("binding", &self.binding)
            .finish()
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Fetched { conn, .. } => write!(f, "Fetched({})", conn),
            Binding::Local { params } => write!(f, "Local({} params)", params.len()),
        }
    }
}

impl Function {
    pub(crate) fn fetched(engine: Arc<dyn RfcEngine>, conn: ConnHandle, desc: Arc<FunctionDesc>) -> Self {
        let name = desc.name().to_string();
        Self { engine, name, binding: Binding::Fetched { conn, desc } }
    }

    /// Declares a function with an empty local descriptor.
    pub fn local(engine: Arc<dyn RfcEngine>, name: &str) -> Self {
        Self {
            engine,
            name: name.to_uppercase(),
            binding: Binding::Local { params: Vec::new() },
        }
    }

    /// The function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a parameter to a local descriptor.
    ///
    /// # Errors
    ///
    /// Fails on a fetched function (remote descriptors are immutable),
    /// on an invalid definition, and on a duplicate parameter name.
    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<()> {
        let params = match &mut self.binding {
            Binding::Fetched { .. } => {
                return Err(RfcError::InvalidParameter(
                    "descriptor fetched from the remote system is immutable".into(),
                ));
            }
            Binding::Local { params } => params,
        };
        let field = parameter.build()?;
        if params.iter().any(|p| p.name == field.name) {
            return Err(RfcError::InvalidParameter(format!(
                "duplicate parameter {}",
                field.name
            )));
        }
        params.push(field);
        Ok(())
    }

    /// Number of declared parameters.
    pub fn parameter_count(&self) -> usize {
        match &self.binding {
            Binding::Fetched { desc, .. } => desc.parameter_count(),
            Binding::Local { params } => params.len(),
        }
    }

    /// The immutable descriptor shared by call instances.
    pub fn descriptor(&self) -> Arc<FunctionDesc> {
        match &self.binding {
            Binding::Fetched { desc, .. } => desc.clone(),
            Binding::Local { params } => {
                Arc::new(FunctionDesc::new(self.name.as_str(), params.clone()))
            }
        }
    }

    /// Creates a callable instance of this function.
    pub fn call(&self) -> Result<FunctionCall> {
        let desc = self.descriptor();
        let handle = self.engine.create_function_data(&desc)?;
        tracing::debug!(function = %self.name, %handle, "call instance created");
        let core = ContainerCore::owned(self.engine.clone(), handle, Shape::Function(desc.clone()));
        let conn = match &self.binding {
            Binding::Fetched { conn, .. } => Some(*conn),
            Binding::Local { .. } => None,
        };
        Ok(FunctionCall { core, desc, conn })
    }
}

/// One invocable instance of a function, with its parameter container.
///
/// Client-path instances come from [`Function::call`] and carry the
/// session they were fetched over. Server-path instances are built from
/// the raw inbound handle and carry no session: they can marshal data
/// but never invoke.
#[derive(Debug)]
pub struct FunctionCall {
    core: Arc<ContainerCore>,
    desc: Arc<FunctionDesc>,
    conn: Option<ConnHandle>,
}

impl FunctionCall {
    /// Wraps the raw container of an inbound server call.
    ///
    /// The engine owns the container for the duration of the callback;
    /// the wrapper never destroys it.
    pub(crate) fn from_inbound(
        engine: Arc<dyn RfcEngine>,
        handle: ContainerHandle,
        desc: Arc<FunctionDesc>,
    ) -> Self {
        let core = ContainerCore::borrowed(engine, handle, Shape::Function(desc.clone()));
        Self { core, desc, conn: None }
    }

    /// The name of the function this call instantiates.
    pub fn function_name(&self) -> &str {
        self.desc.name()
    }

    /// The descriptor this call was instantiated from.
    pub fn descriptor(&self) -> &Arc<FunctionDesc> {
        &self.desc
    }

    /// Executes the call synchronously over its session.
    ///
    /// # Errors
    ///
    /// Fails with [`RfcError::NotCallable`] when the instance has no
    /// session (a locally declared function or an inbound server call).
    pub fn invoke(&self) -> Result<()> {
        let conn = self.conn.ok_or(RfcError::NotCallable)?;
        tracing::debug!(function = %self.desc.name(), %conn, "invoke");
        Ok(self.core.engine().invoke(conn, self.core.handle())?)
    }

    /// Queues the call under the given transaction.
    pub fn invoke_in_transaction(&self, transaction: &Transaction) -> Result<()> {
        if self.conn.is_none() {
            return Err(RfcError::NotCallable);
        }
        let tx = transaction.handle()?;
        tracing::debug!(function = %self.desc.name(), %tx, "transactional invoke");
        Ok(self.core.engine().invoke_in_transaction(tx, self.core.handle())?)
    }

    /// Reports whether a parameter will be transmitted with the call.
    pub fn is_active(&self, name: &str) -> Result<bool> {
        let upper = name.to_uppercase();
        Ok(self.core.engine().is_parameter_active(self.core.handle(), &upper)?)
    }

    /// Gates whether an optional parameter is transmitted with the call.
    pub fn set_active(&self, name: &str, active: bool) -> Result<()> {
        let upper = name.to_uppercase();
        Ok(self.core.engine().set_parameter_active(self.core.handle(), &upper, active)?)
    }
}

impl DataContainer for FunctionCall {
    fn core(&self) -> &Arc<ContainerCore> {
        &self.core
    }
}
