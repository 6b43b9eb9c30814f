//! Tables: containers with a row cursor.

use std::sync::Arc;

use rfcwire::Result;

use crate::container::ContainerCore;
use crate::container::DataContainer;
use crate::container::Structure;
use crate::engine::ContainerHandle;

/// An ordered, cursor-addressable sequence of structures.
///
/// The cursor lives inside the engine, not in this wrapper. Only one
/// traversal at a time is meaningful, and iteration while rows are being
/// inserted elsewhere is undefined.
#[derive(Debug, Clone)]
pub struct Table {
    core: Arc<ContainerCore>,
}

impl Table {
    pub(crate) fn from_core(core: Arc<ContainerCore>) -> Self {
        Self { core }
    }

    pub(crate) fn handle(&self) -> ContainerHandle {
        self.core.handle()
    }

    /// Number of rows.
    pub fn size(&self) -> Result<u32> {
        Ok(self.core.engine().row_count(self.core.handle())?)
    }

    /// Deletes every row.
    pub fn clear(&self) -> Result<()> {
        Ok(self.core.engine().delete_all_rows(self.core.handle())?)
    }

    /// Appends a copy of the given structure as a new row.
    pub fn append(&self, row: &Structure) -> Result<()> {
        Ok(self.core.engine().append_row(self.core.handle(), row.handle())?)
    }

    /// Appends an empty row and returns it for in-place population.
    pub fn new_row(&self) -> Result<Structure> {
        let handle = self.core.engine().append_new_row(self.core.handle())?;
        Ok(self.row_view(handle))
    }

    /// Returns the row at an absolute index.
    pub fn row_at(&self, index: u32) -> Result<Structure> {
        let engine = self.core.engine();
        engine.move_to(self.core.handle(), index)?;
        let handle = engine.current_row(self.core.handle())?;
        Ok(self.row_view(handle))
    }

    /// Iterates the rows front to back.
    ///
    /// The row count is read once, up front; an empty table yields
    /// nothing without touching the cursor.
    pub fn rows(&self) -> Result<Rows> {
        let remaining = self.size()?;
        if remaining > 0 {
            self.core.engine().move_to_first_row(self.core.handle())?;
        }
        Ok(Rows { table: self.clone(), remaining })
    }

    fn row_view(&self, handle: ContainerHandle) -> Structure {
        // Rows share the table's field layout.
        let shape = self.core.shape();
        Structure::from_core(ContainerCore::view(&self.core, handle, shape))
    }
}

impl DataContainer for Table {
    fn core(&self) -> &Arc<ContainerCore> {
        &self.core
    }
}

/// Forward row iterator; see [`Table::rows`].
pub struct Rows {
    table: Table,
    remaining: u32,
}

impl Iterator for Rows {
    type Item = Result<Structure>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let engine = self.table.core.engine();
        let handle = self.table.core.handle();
        let row = match engine.current_row(handle) {
            Ok(row) => row,
            Err(info) => return Some(Err(info.into())),
        };
        self.remaining -= 1;
        if self.remaining > 0 {
            if let Err(info) = engine.move_to_next_row(handle) {
                return Some(Err(info.into()));
            }
        }
        Some(Ok(self.table.row_view(row)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}
