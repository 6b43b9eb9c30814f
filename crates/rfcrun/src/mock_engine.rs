//! In-memory engine double for testing.
//!
//! Used internally by the test suite and by demos; not something a real
//! deployment would talk to. The double keeps the engine-side contract
//! faithful where the wrappers depend on it: fixed-width pad/truncate
//! semantics, engine-held table cursors with BOF/EOF errors, logon
//! checking, transaction phase ordering, and a server-side inbound
//! queue with scripted poll outcomes.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use dashmap::DashMap;
use widestring::U16String;

use rfcwire::ErrorGroup;
use rfcwire::ErrorInfo;
use rfcwire::FieldDesc;
use rfcwire::FunctionDesc;
use rfcwire::ResultCode;
use rfcwire::RfcType;
use rfcwire::TypeDesc;

use crate::engine::ConnAttributes;
use crate::engine::ConnHandle;
use crate::engine::ContainerHandle;
use crate::engine::EngineResult;
use crate::engine::RfcEngine;
use crate::engine::ServerCallback;
use crate::engine::ServerHandle;
use crate::engine::TransactionHandle;
use crate::engine::WideParam;

/// Scripted behavior of one remote function, run on `invoke`.
pub type InvokeHook = Box<dyn Fn(&MockEngine, ContainerHandle) -> EngineResult<()> + Send + Sync>;

/// Fills the import parameters of one enqueued inbound server call.
pub type CallSetup = Box<dyn FnOnce(&MockEngine, ContainerHandle) -> EngineResult<()> + Send + Sync>;

#[derive(Clone)]
enum Slot {
    /// Fixed-width wide text (char, num, bcd, date, time).
    Text(Vec<u16>),
    /// Fixed-size raw bytes.
    Bytes(Vec<u8>),
    F64(f64),
    I32(i32),
    I16(i16),
    U8(u8),
    /// Variable-length wide text.
    Str(Vec<u16>),
    /// Variable-length raw bytes.
    XStr(Vec<u8>),
    /// Nested structure or table container.
    Child(u64),
}

#[derive(Clone)]
struct TableRows {
    row_type: Arc<TypeDesc>,
    rows: Vec<u64>,
    cursor: usize,
}

#[derive(Clone)]
struct ContainerState {
    layout: Vec<FieldDesc>,
    func_name: Option<String>,
    values: HashMap<String, Slot>,
    active: HashMap<String, bool>,
    rows: Option<TableRows>,
}

impl ContainerState {
    fn for_function(desc: &Arc<FunctionDesc>) -> Self {
        Self {
            layout: desc.iter().cloned().collect(),
            func_name: Some(desc.name().to_string()),
            values: HashMap::new(),
            active: HashMap::new(),
            rows: None,
        }
    }

    fn composite(row_type: Arc<TypeDesc>, table: bool) -> Self {
        Self {
            layout: row_type.iter().cloned().collect(),
            func_name: None,
            values: HashMap::new(),
            active: HashMap::new(),
            rows: table.then(|| TableRows { row_type, rows: Vec::new(), cursor: 0 }),
        }
    }
}

struct ConnState {
    user: String,
    attrs: ConnAttributes,
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum TxPhase {
    Open,
    Submitted,
    Confirmed,
}

struct TxState {
    tid: String,
    phase: TxPhase,
}

struct Pending {
    function: String,
    setup: CallSetup,
}

struct Installed {
    desc: Arc<FunctionDesc>,
    callback: ServerCallback,
}

struct ServerState {
    program_id: String,
    handlers: HashMap<String, Installed>,
    pending: VecDeque<Pending>,
}

/// The in-memory stand-in for the native RFC engine.
pub struct MockEngine {
    users: DashMap<String, String>,
    functions: DashMap<String, Arc<FunctionDesc>>,
    hooks: DashMap<String, InvokeHook>,
    conns: DashMap<u64, ConnState>,
    transactions: DashMap<u64, TxState>,
    servers: DashMap<u64, ServerState>,
    // Containers form a graph (tables hold row containers, structures
    // hold children), so they live behind one lock instead of a sharded
    // map.
    containers: Mutex<HashMap<u64, ContainerState>>,
    completed: Mutex<Vec<(String, ContainerHandle)>>,
    journal: Mutex<Vec<String>>,
    fail_submit: AtomicBool,
    idle_budget: AtomicI32,
    next_handle: AtomicU64,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            functions: DashMap::new(),
            hooks: DashMap::new(),
            conns: DashMap::new(),
            transactions: DashMap::new(),
            servers: DashMap::new(),
            containers: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
            fail_submit: AtomicBool::new(false),
            idle_budget: AtomicI32::new(0),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Accepts logons for the given user. With no users configured,
    /// every logon succeeds.
    pub fn with_user(self, user: &str, passwd: &str) -> Self {
        self.users.insert(user.to_string(), passwd.to_string());
        self
    }

    /// Publishes a function descriptor for remote fetching.
    pub fn define_function(&self, desc: FunctionDesc) -> Arc<FunctionDesc> {
        let desc = Arc::new(desc);
        self.functions.insert(desc.name().to_string(), desc.clone());
        desc
    }

    /// Scripts the remote side of `invoke` for one function.
    pub fn on_invoke(&self, name: &str, hook: InvokeHook) {
        self.hooks.insert(name.to_uppercase(), hook);
    }

    /// Lets the dispatch loop see `n` empty polls (reported as retry)
    /// before the registration reports closed.
    pub fn allow_idle_polls(&self, n: i32) {
        self.idle_budget.store(n, Ordering::Relaxed);
    }

    /// Makes the next transaction submit fail with an external failure.
    pub fn fail_next_submit(&self) {
        self.fail_submit.store(true, Ordering::Relaxed);
    }

    /// Seeds a decimal-float field, which has no public write path.
    pub fn seed_decf(&self, handle: ContainerHandle, field: &str, value: f64) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Decf16 | RfcType::Decf34 => Ok(Slot::F64(value)),
            _ => Err(not_that_type(field, "a decimal float")),
        })
    }

    /// Everything the engine recorded, in order.
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().map(|journal| (*journal).clone()).unwrap_or_default()
    }

    /// Inbound calls the server side completed, with their containers
    /// left alive for inspection.
    pub fn completed_calls(&self) -> Vec<(String, ContainerHandle)> {
        self.completed.lock().map(|calls| (*calls).clone()).unwrap_or_default()
    }

    /// Queues an inbound call for the server registered under
    /// `program_id`; `setup` fills the import parameters.
    pub fn enqueue_call(&self, program_id: &str, function: &str, setup: CallSetup) -> EngineResult<()> {
        for mut server in self.servers.iter_mut() {
            if server.program_id == program_id {
                server.pending.push_back(Pending { function: function.to_uppercase(), setup });
                return Ok(());
            }
        }
        Err(ErrorInfo::not_found(format!("server {}", program_id)))
    }

    // ---- internals ----

    fn record(&self, entry: String) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(entry);
        }
    }

    fn alloc(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, HashMap<u64, ContainerState>>> {
        self.containers
            .lock()
            .map_err(|_| ErrorInfo::external_failure("container table poisoned"))
    }

    fn field_of(layout: &[FieldDesc], name: &str) -> EngineResult<FieldDesc> {
        layout
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| ErrorInfo::not_found(format!("field {}", name)))
    }

    /// Element access on a table handle operates on the row under the
    /// cursor, exactly like the real engine.
    fn resolve_target(map: &HashMap<u64, ContainerState>, id: u64) -> EngineResult<u64> {
        let state = map.get(&id).ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        match &state.rows {
            None => Ok(id),
            Some(table) => table
                .rows
                .get(table.cursor)
                .copied()
                .ok_or_else(ErrorInfo::table_move_eof),
        }
    }

    fn read_field<T>(
        &self,
        handle: ContainerHandle,
        field: &str,
        f: impl FnOnce(&FieldDesc, &Slot) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let map = self.lock()?;
        let id = Self::resolve_target(&map, handle.0)?;
        let state = map.get(&id).ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        let desc = Self::field_of(&state.layout, field)?;
        match state.values.get(desc.name.as_str()) {
            Some(slot) => f(&desc, slot),
            None => {
                let slot = default_slot(&desc)
                    .ok_or_else(|| not_that_type(field, "an elementary field"))?;
                f(&desc, &slot)
            }
        }
    }

    fn write_field(
        &self,
        handle: ContainerHandle,
        field: &str,
        f: impl FnOnce(&FieldDesc) -> EngineResult<Slot>,
    ) -> EngineResult<()> {
        let mut map = self.lock()?;
        let id = Self::resolve_target(&map, handle.0)?;
        let state = map
            .get_mut(&id)
            .ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        let desc = Self::field_of(&state.layout, field)?;
        let slot = f(&desc)?;
        state.values.insert(desc.name, slot);
        Ok(())
    }

    fn child_container(
        &self,
        handle: ContainerHandle,
        field: &str,
        want_table: bool,
    ) -> EngineResult<ContainerHandle> {
        let mut map = self.lock()?;
        let id = Self::resolve_target(&map, handle.0)?;
        let state = map.get(&id).ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        let desc = Self::field_of(&state.layout, field)?;
        let expected = if want_table { RfcType::Table } else { RfcType::Structure };
        if desc.ty != expected {
            return Err(not_that_type(field, expected.name()));
        }
        if let Some(Slot::Child(child)) = state.values.get(desc.name.as_str()) {
            return Ok(ContainerHandle(*child));
        }
        let row_type = desc
            .nested
            .clone()
            .ok_or_else(|| ErrorInfo::invalid_parameter(format!("field {} has no nested type", field)))?;
        let child = self.alloc();
        map.insert(child, ContainerState::composite(row_type, want_table));
        map.get_mut(&id)
            .ok_or_else(|| ErrorInfo::invalid_handle("container"))?
            .values
            .insert(desc.name, Slot::Child(child));
        Ok(ContainerHandle(child))
    }

    /// Deep copy of a container subtree; copies get fresh handles.
    fn clone_container(&self, map: &mut HashMap<u64, ContainerState>, id: u64) -> EngineResult<u64> {
        let mut copy = map
            .get(&id)
            .cloned()
            .ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        let children: Vec<(String, u64)> = copy
            .values
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Child(child) => Some((name.clone(), *child)),
                _ => None,
            })
            .collect();
        for (name, child) in children {
            let cloned = self.clone_container(map, child)?;
            copy.values.insert(name, Slot::Child(cloned));
        }
        if let Some(table) = &mut copy.rows {
            let mut cloned_rows = Vec::with_capacity(table.rows.len());
            for row in &table.rows {
                cloned_rows.push(self.clone_container(map, *row)?);
            }
            table.rows = cloned_rows;
        }
        let new_id = self.alloc();
        map.insert(new_id, copy);
        Ok(new_id)
    }

    fn with_table<T>(
        &self,
        handle: ContainerHandle,
        f: impl FnOnce(&mut TableRows) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut map = self.lock()?;
        let state = map
            .get_mut(&handle.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        let table = state
            .rows
            .as_mut()
            .ok_or_else(|| not_that_type("container", "a table"))?;
        f(table)
    }

    fn decode_params(params: &[WideParam]) -> Vec<(String, String)> {
        params
            .iter()
            .map(|p| (p.name.to_string_lossy().to_lowercase(), p.value.to_string_lossy()))
            .collect()
    }
}

fn not_that_type(field: &str, expected: &str) -> ErrorInfo {
    ErrorInfo::invalid_parameter(format!("field {} is not {}", field, expected))
}

fn fit(value: &[u16], width: u32) -> Vec<u16> {
    let width = width as usize;
    let mut units: Vec<u16> = value.iter().copied().take(width).collect();
    units.resize(width, u16::from(b' '));
    units
}

fn default_slot(desc: &FieldDesc) -> Option<Slot> {
    let slot = match desc.ty {
        RfcType::Char | RfcType::Num => Slot::Text(fit(&[], desc.nuc_length)),
        RfcType::Bcd => Slot::Text(fit(&[u16::from(b'0')], desc.nuc_length)),
        RfcType::Date => Slot::Text(vec![u16::from(b'0'); 8]),
        RfcType::Time => Slot::Text(vec![u16::from(b'0'); 6]),
        RfcType::Byte => Slot::Bytes(vec![0; desc.nuc_length as usize]),
        RfcType::Float | RfcType::Decf16 | RfcType::Decf34 => Slot::F64(0.0),
        RfcType::Int => Slot::I32(0),
        RfcType::Int2 => Slot::I16(0),
        RfcType::Int1 => Slot::U8(0),
        RfcType::String => Slot::Str(Vec::new()),
        RfcType::XString => Slot::XStr(Vec::new()),
        RfcType::Table | RfcType::Structure | RfcType::Null | RfcType::XmlData => return None,
    };
    Some(slot)
}

impl RfcEngine for MockEngine {
    fn open_connection(&self, params: &[WideParam]) -> EngineResult<ConnHandle> {
        let decoded = Self::decode_params(params);
        let lookup = |key: &str| -> String {
            decoded
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        };
        let user = lookup("user");
        if !self.users.is_empty() {
            let passwd = lookup("passwd");
            let known = self.users.get(&user).map(|p| *p == passwd).unwrap_or(false);
            if !known {
                return Err(ErrorInfo::logon_failure("Name or password is incorrect (repeat logon)"));
            }
        }
        let attrs = ConnAttributes {
            dest: lookup("dest"),
            host: lookup("ashost"),
            partner_host: lookup("ashost"),
            sys_number: lookup("sysnr"),
            sys_id: "MCK".to_string(),
            client: lookup("client"),
            user: user.clone(),
            language: lookup("lang"),
            iso_language: lookup("lang"),
            codepage: "4103".to_string(),
            partner_codepage: "4103".to_string(),
            rfc_role: "C".to_string(),
            kind: "E".to_string(),
            partner_kind: "3".to_string(),
            rel: "753".to_string(),
            partner_rel: "753".to_string(),
            kernel_rel: "753".to_string(),
            ..ConnAttributes::default()
        };
        let id = self.alloc();
        self.conns.insert(id, ConnState { user: user.clone(), attrs });
        self.record(format!("open {}", user));
        Ok(ConnHandle(id))
    }

    fn close_connection(&self, conn: ConnHandle) -> EngineResult<()> {
        let (_, state) = self
            .conns
            .remove(&conn.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("connection"))?;
        self.record(format!("close {}", state.user));
        Ok(())
    }

    fn connection_attributes(&self, conn: ConnHandle) -> EngineResult<ConnAttributes> {
        let state = self
            .conns
            .get(&conn.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("connection"))?;
        self.record("attributes".to_string());
        Ok(state.attrs.clone())
    }

    fn ping(&self, conn: ConnHandle) -> EngineResult<()> {
        if self.conns.contains_key(&conn.0) {
            Ok(())
        } else {
            Err(ErrorInfo::invalid_handle("connection"))
        }
    }

    fn function_desc(&self, conn: ConnHandle, name: &str) -> EngineResult<Arc<FunctionDesc>> {
        if !self.conns.contains_key(&conn.0) {
            return Err(ErrorInfo::invalid_handle("connection"));
        }
        self.functions
            .get(&name.to_uppercase())
            .map(|desc| desc.clone())
            .ok_or_else(|| {
                ErrorInfo::abap_runtime_failure("FU_NOT_FOUND", format!("function {} not found", name))
            })
    }

    fn create_function_data(&self, desc: &Arc<FunctionDesc>) -> EngineResult<ContainerHandle> {
        let id = self.alloc();
        self.lock()?.insert(id, ContainerState::for_function(desc));
        Ok(ContainerHandle(id))
    }

    fn destroy_container(&self, handle: ContainerHandle) -> EngineResult<()> {
        self.lock()?
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| ErrorInfo::invalid_handle("container"))
    }

    fn get_chars(&self, handle: ContainerHandle, field: &str) -> EngineResult<U16String> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Char | RfcType::Bcd, Slot::Text(units)) => Ok(U16String::from_vec(units.clone())),
            _ => Err(not_that_type(field, "a character field")),
        })
    }

    fn set_chars(&self, handle: ContainerHandle, field: &str, value: &[u16]) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Char => Ok(Slot::Text(fit(value, desc.nuc_length))),
            _ => Err(not_that_type(field, "a character field")),
        })
    }

    fn get_num(&self, handle: ContainerHandle, field: &str) -> EngineResult<U16String> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Num, Slot::Text(units)) => Ok(U16String::from_vec(units.clone())),
            _ => Err(not_that_type(field, "a numeric text field")),
        })
    }

    fn set_num(&self, handle: ContainerHandle, field: &str, value: &[u16]) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Num => Ok(Slot::Text(fit(value, desc.nuc_length))),
            _ => Err(not_that_type(field, "a numeric text field")),
        })
    }

    fn get_bytes(&self, handle: ContainerHandle, field: &str) -> EngineResult<Vec<u8>> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Byte, Slot::Bytes(bytes)) => Ok(bytes.clone()),
            _ => Err(not_that_type(field, "a byte field")),
        })
    }

    fn set_bytes(&self, handle: ContainerHandle, field: &str, value: &[u8]) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Byte => {
                let mut bytes: Vec<u8> = value.iter().copied().take(desc.nuc_length as usize).collect();
                bytes.resize(desc.nuc_length as usize, 0);
                Ok(Slot::Bytes(bytes))
            }
            _ => Err(not_that_type(field, "a byte field")),
        })
    }

    fn get_date(&self, handle: ContainerHandle, field: &str) -> EngineResult<[u16; 8]> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Date, Slot::Text(units)) if units.len() == 8 => {
                let mut out = [0u16; 8];
                out.copy_from_slice(units);
                Ok(out)
            }
            _ => Err(not_that_type(field, "a date field")),
        })
    }

    fn set_date(&self, handle: ContainerHandle, field: &str, value: &[u16; 8]) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Date => Ok(Slot::Text(value.to_vec())),
            _ => Err(not_that_type(field, "a date field")),
        })
    }

    fn get_time(&self, handle: ContainerHandle, field: &str) -> EngineResult<[u16; 6]> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Time, Slot::Text(units)) if units.len() == 6 => {
                let mut out = [0u16; 6];
                out.copy_from_slice(units);
                Ok(out)
            }
            _ => Err(not_that_type(field, "a time field")),
        })
    }

    fn set_time(&self, handle: ContainerHandle, field: &str, value: &[u16; 6]) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Time => Ok(Slot::Text(value.to_vec())),
            _ => Err(not_that_type(field, "a time field")),
        })
    }

    fn get_float(&self, handle: ContainerHandle, field: &str) -> EngineResult<f64> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Float, Slot::F64(v)) => Ok(*v),
            _ => Err(not_that_type(field, "a float field")),
        })
    }

    fn set_float(&self, handle: ContainerHandle, field: &str, value: f64) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Float => Ok(Slot::F64(value)),
            _ => Err(not_that_type(field, "a float field")),
        })
    }

    fn get_int(&self, handle: ContainerHandle, field: &str) -> EngineResult<i32> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Int, Slot::I32(v)) => Ok(*v),
            _ => Err(not_that_type(field, "an int field")),
        })
    }

    fn set_int(&self, handle: ContainerHandle, field: &str, value: i32) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Int => Ok(Slot::I32(value)),
            _ => Err(not_that_type(field, "an int field")),
        })
    }

    fn get_int2(&self, handle: ContainerHandle, field: &str) -> EngineResult<i16> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Int2, Slot::I16(v)) => Ok(*v),
            _ => Err(not_that_type(field, "an int2 field")),
        })
    }

    fn set_int2(&self, handle: ContainerHandle, field: &str, value: i16) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Int2 => Ok(Slot::I16(value)),
            _ => Err(not_that_type(field, "an int2 field")),
        })
    }

    fn get_int1(&self, handle: ContainerHandle, field: &str) -> EngineResult<u8> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Int1, Slot::U8(v)) => Ok(*v),
            _ => Err(not_that_type(field, "an int1 field")),
        })
    }

    fn set_int1(&self, handle: ContainerHandle, field: &str, value: u8) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Int1 => Ok(Slot::U8(value)),
            _ => Err(not_that_type(field, "an int1 field")),
        })
    }

    fn get_decf16(&self, handle: ContainerHandle, field: &str) -> EngineResult<f64> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Decf16, Slot::F64(v)) => Ok(*v),
            _ => Err(not_that_type(field, "a decf16 field")),
        })
    }

    fn get_decf34(&self, handle: ContainerHandle, field: &str) -> EngineResult<f64> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::Decf34, Slot::F64(v)) => Ok(*v),
            _ => Err(not_that_type(field, "a decf34 field")),
        })
    }

    fn string_length(&self, handle: ContainerHandle, field: &str) -> EngineResult<u32> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::String, Slot::Str(units)) => Ok(units.len() as u32),
            _ => Err(not_that_type(field, "a string field")),
        })
    }

    fn get_string(&self, handle: ContainerHandle, field: &str, buf_len: u32) -> EngineResult<U16String> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::String, Slot::Str(units)) => {
                // The buffer must hold the text plus its terminator.
                if (buf_len as usize) < units.len() + 1 {
                    return Err(ErrorInfo::new(
                        ResultCode::BufferTooSmall,
                        ErrorGroup::ExternalRuntimeFailure,
                        format!("field {} needs {} units", field, units.len() + 1),
                    ));
                }
                Ok(U16String::from_vec(units.clone()))
            }
            _ => Err(not_that_type(field, "a string field")),
        })
    }

    fn set_string(&self, handle: ContainerHandle, field: &str, value: &[u16]) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::String => Ok(Slot::Str(value.to_vec())),
            // Packed decimals accept their value as decimal text.
            RfcType::Bcd => Ok(Slot::Text(fit(value, desc.nuc_length))),
            _ => Err(not_that_type(field, "a string field")),
        })
    }

    fn x_string_length(&self, handle: ContainerHandle, field: &str) -> EngineResult<u32> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::XString, Slot::XStr(bytes)) => Ok(bytes.len() as u32),
            _ => Err(not_that_type(field, "an xstring field")),
        })
    }

    fn get_x_string(&self, handle: ContainerHandle, field: &str, buf_len: u32) -> EngineResult<Vec<u8>> {
        self.read_field(handle, field, |desc, slot| match (desc.ty, slot) {
            (RfcType::XString, Slot::XStr(bytes)) => {
                if (buf_len as usize) < bytes.len() {
                    return Err(ErrorInfo::new(
                        ResultCode::BufferTooSmall,
                        ErrorGroup::ExternalRuntimeFailure,
                        format!("field {} needs {} bytes", field, bytes.len()),
                    ));
                }
                Ok(bytes.clone())
            }
            _ => Err(not_that_type(field, "an xstring field")),
        })
    }

    fn set_x_string(&self, handle: ContainerHandle, field: &str, value: &[u8]) -> EngineResult<()> {
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::XString => Ok(Slot::XStr(value.to_vec())),
            _ => Err(not_that_type(field, "an xstring field")),
        })
    }

    fn get_structure(&self, handle: ContainerHandle, field: &str) -> EngineResult<ContainerHandle> {
        self.child_container(handle, field, false)
    }

    fn set_structure(&self, handle: ContainerHandle, field: &str, value: ContainerHandle) -> EngineResult<()> {
        let copy = {
            let mut map = self.lock()?;
            self.clone_container(&mut map, value.0)?
        };
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Structure => Ok(Slot::Child(copy)),
            _ => Err(not_that_type(field, "a structure field")),
        })
    }

    fn get_table(&self, handle: ContainerHandle, field: &str) -> EngineResult<ContainerHandle> {
        self.child_container(handle, field, true)
    }

    fn set_table(&self, handle: ContainerHandle, field: &str, value: ContainerHandle) -> EngineResult<()> {
        let copy = {
            let mut map = self.lock()?;
            self.clone_container(&mut map, value.0)?
        };
        self.write_field(handle, field, |desc| match desc.ty {
            RfcType::Table => Ok(Slot::Child(copy)),
            _ => Err(not_that_type(field, "a table field")),
        })
    }

    fn row_count(&self, handle: ContainerHandle) -> EngineResult<u32> {
        self.with_table(handle, |table| Ok(table.rows.len() as u32))
    }

    fn delete_all_rows(&self, handle: ContainerHandle) -> EngineResult<()> {
        self.with_table(handle, |table| {
            table.rows.clear();
            table.cursor = 0;
            Ok(())
        })
    }

    fn move_to(&self, handle: ContainerHandle, index: u32) -> EngineResult<()> {
        self.with_table(handle, |table| {
            if (index as usize) >= table.rows.len() {
                return Err(ErrorInfo::table_move_eof());
            }
            table.cursor = index as usize;
            Ok(())
        })
    }

    fn move_to_first_row(&self, handle: ContainerHandle) -> EngineResult<()> {
        self.with_table(handle, |table| {
            if table.rows.is_empty() {
                return Err(ErrorInfo::table_move_bof());
            }
            table.cursor = 0;
            Ok(())
        })
    }

    fn move_to_next_row(&self, handle: ContainerHandle) -> EngineResult<()> {
        self.with_table(handle, |table| {
            if table.cursor + 1 >= table.rows.len() {
                return Err(ErrorInfo::table_move_eof());
            }
            table.cursor += 1;
            Ok(())
        })
    }

    fn current_row(&self, handle: ContainerHandle) -> EngineResult<ContainerHandle> {
        self.with_table(handle, |table| {
            table
                .rows
                .get(table.cursor)
                .copied()
                .map(ContainerHandle)
                .ok_or_else(ErrorInfo::table_move_eof)
        })
    }

    fn append_new_row(&self, handle: ContainerHandle) -> EngineResult<ContainerHandle> {
        let row = self.alloc();
        let mut map = self.lock()?;
        let state = map
            .get_mut(&handle.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        let table = state
            .rows
            .as_mut()
            .ok_or_else(|| not_that_type("container", "a table"))?;
        let row_type = table.row_type.clone();
        table.rows.push(row);
        table.cursor = table.rows.len() - 1;
        map.insert(row, ContainerState::composite(row_type, false));
        Ok(ContainerHandle(row))
    }

    fn append_row(&self, handle: ContainerHandle, row: ContainerHandle) -> EngineResult<()> {
        let mut map = self.lock()?;
        let copy = self.clone_container(&mut map, row.0)?;
        let state = map
            .get_mut(&handle.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        let table = state
            .rows
            .as_mut()
            .ok_or_else(|| not_that_type("container", "a table"))?;
        table.rows.push(copy);
        table.cursor = table.rows.len() - 1;
        Ok(())
    }

    fn is_parameter_active(&self, handle: ContainerHandle, name: &str) -> EngineResult<bool> {
        let map = self.lock()?;
        let state = map.get(&handle.0).ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        Self::field_of(&state.layout, name)?;
        Ok(*state.active.get(name).unwrap_or(&true))
    }

    fn set_parameter_active(&self, handle: ContainerHandle, name: &str, active: bool) -> EngineResult<()> {
        let mut map = self.lock()?;
        let state = map
            .get_mut(&handle.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
        let desc = Self::field_of(&state.layout, name)?;
        state.active.insert(desc.name, active);
        Ok(())
    }

    fn invoke(&self, conn: ConnHandle, call: ContainerHandle) -> EngineResult<()> {
        if !self.conns.contains_key(&conn.0) {
            return Err(ErrorInfo::invalid_handle("connection"));
        }
        let (name, transmitted) = {
            let map = self.lock()?;
            let state = map.get(&call.0).ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
            let name = state
                .func_name
                .clone()
                .ok_or_else(|| ErrorInfo::invalid_parameter("container is not a function call"))?;
            let transmitted: Vec<String> = state
                .layout
                .iter()
                .filter(|p| *state.active.get(p.name.as_str()).unwrap_or(&true))
                .map(|p| p.name.clone())
                .collect();
            (name, transmitted)
        };
        self.record(format!("invoke {} active=[{}]", name, transmitted.join(",")));
        match self.hooks.get(&name) {
            Some(hook) => (hook.value())(self, call),
            None => Err(ErrorInfo::not_found(format!("function {}", name))),
        }
    }

    fn invoke_in_transaction(&self, tx: TransactionHandle, call: ContainerHandle) -> EngineResult<()> {
        let tid = {
            let state = self
                .transactions
                .get(&tx.0)
                .ok_or_else(|| ErrorInfo::invalid_handle("transaction"))?;
            if state.phase != TxPhase::Open {
                return Err(ErrorInfo::illegal_state("transaction already submitted"));
            }
            state.tid.clone()
        };
        let name = {
            let map = self.lock()?;
            let state = map.get(&call.0).ok_or_else(|| ErrorInfo::invalid_handle("container"))?;
            state
                .func_name
                .clone()
                .ok_or_else(|| ErrorInfo::invalid_parameter("container is not a function call"))?
        };
        self.record(format!("tx-invoke {} {}", tid, name));
        Ok(())
    }

    fn transaction_id(&self, conn: ConnHandle) -> EngineResult<String> {
        if !self.conns.contains_key(&conn.0) {
            return Err(ErrorInfo::invalid_handle("connection"));
        }
        let minted: u128 = rand::random::<u128>() >> 32;
        Ok(format!("{:024X}", minted))
    }

    fn create_transaction(
        &self,
        conn: ConnHandle,
        tid: &str,
        queue: Option<&str>,
    ) -> EngineResult<TransactionHandle> {
        if !self.conns.contains_key(&conn.0) {
            return Err(ErrorInfo::invalid_handle("connection"));
        }
        let id = self.alloc();
        self.transactions.insert(id, TxState { tid: tid.to_string(), phase: TxPhase::Open });
        self.record(match queue {
            Some(queue) => format!("create-tx {} queue={}", tid, queue),
            None => format!("create-tx {}", tid),
        });
        Ok(TransactionHandle(id))
    }

    fn submit_transaction(&self, tx: TransactionHandle) -> EngineResult<()> {
        let mut state = self
            .transactions
            .get_mut(&tx.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("transaction"))?;
        if self.fail_submit.swap(false, Ordering::Relaxed) {
            return Err(ErrorInfo::external_failure("scripted submit failure"));
        }
        if state.phase != TxPhase::Open {
            return Err(ErrorInfo::illegal_state("transaction already submitted"));
        }
        state.phase = TxPhase::Submitted;
        self.record(format!("submit {}", state.tid));
        Ok(())
    }

    fn confirm_transaction(&self, tx: TransactionHandle) -> EngineResult<()> {
        let mut state = self
            .transactions
            .get_mut(&tx.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("transaction"))?;
        if state.phase != TxPhase::Submitted {
            return Err(ErrorInfo::illegal_state("transaction not submitted"));
        }
        state.phase = TxPhase::Confirmed;
        self.record(format!("confirm {}", state.tid));
        Ok(())
    }

    fn destroy_transaction(&self, tx: TransactionHandle) -> EngineResult<()> {
        let (_, state) = self
            .transactions
            .remove(&tx.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("transaction"))?;
        self.record(format!("destroy {}", state.tid));
        Ok(())
    }

    fn register_server(&self, params: &[WideParam]) -> EngineResult<ServerHandle> {
        let decoded = Self::decode_params(params);
        let program_id = decoded
            .iter()
            .find(|(name, _)| name == "program_id")
            .map(|(_, value)| value.clone())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ErrorInfo::invalid_parameter("program_id is required"))?;
        let id = self.alloc();
        self.servers.insert(
            id,
            ServerState { program_id: program_id.clone(), handlers: HashMap::new(), pending: VecDeque::new() },
        );
        self.record(format!("register {}", program_id));
        Ok(ServerHandle(id))
    }

    fn install_server_function(
        &self,
        server: ServerHandle,
        desc: Arc<FunctionDesc>,
        callback: ServerCallback,
    ) -> EngineResult<()> {
        let mut state = self
            .servers
            .get_mut(&server.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("server"))?;
        let name = desc.name().to_string();
        state.handlers.insert(name.clone(), Installed { desc, callback });
        self.record(format!("install {}", name));
        Ok(())
    }

    fn listen_and_dispatch(&self, server: ServerHandle, _timeout_ms: i32) -> EngineResult<()> {
        let mut state = self
            .servers
            .get_mut(&server.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("server"))?;
        let Some(pending) = state.pending.pop_front() else {
            drop(state);
            self.record("poll-idle".to_string());
            return if self.idle_budget.fetch_sub(1, Ordering::Relaxed) > 0 {
                Err(ErrorInfo::retry())
            } else {
                Err(ErrorInfo::closed("gateway closed the registration"))
            };
        };
        let installed = state
            .handlers
            .get(&pending.function)
            .ok_or_else(|| ErrorInfo::not_found(format!("handler for {}", pending.function)))?;
        let handle = {
            let id = self.alloc();
            self.lock()?.insert(id, ContainerState::for_function(&installed.desc));
            ContainerHandle(id)
        };
        (pending.setup)(self, handle)?;
        self.record(format!("dispatch {}", pending.function));
        (installed.callback)(None, handle)?;
        if let Ok(mut completed) = self.completed.lock() {
            completed.push((pending.function, handle));
        }
        Ok(())
    }

    fn close_server(&self, server: ServerHandle) -> EngineResult<()> {
        let (_, state) = self
            .servers
            .remove(&server.0)
            .ok_or_else(|| ErrorInfo::invalid_handle("server"))?;
        self.record(format!("unregister {}", state.program_id));
        Ok(())
    }
}
