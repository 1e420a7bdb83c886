//! A JSON snapshot file behind the [`AppointmentStore`] seam.
//!
//! The whole document is loaded on open and rewritten after every mutation.
//! Writes go to a sibling temp file first and are renamed into place.
//! Offset-bearing timestamps in the file are read in the clock's zone and
//! saved back in canonical form.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use occurrence_engine::error::Result;
use occurrence_engine::{
    Appointment, AppointmentStore, EngineError, Exception, MemoryStore, RecordFailure, Status,
    WallClock,
};

pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open the snapshot at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>, clock: &WallClock) -> Result<Self> {
        let path = path.into();
        let inner = match fs::read_to_string(&path) {
            Ok(json) => MemoryStore::from_json_in(&json, clock)?,
            Err(e) if e.kind() == ErrorKind::NotFound => MemoryStore::new(),
            Err(e) => {
                return Err(EngineError::Store(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        tracing::debug!(path = %path.display(), "opened snapshot store");
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records in the file that could not be read.
    pub fn load_failures(&self) -> &[RecordFailure] {
        self.inner.load_failures()
    }

    fn save(&self) -> Result<()> {
        let io_err = |e: std::io::Error| {
            EngineError::Store(format!("cannot write {}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, self.inner.to_json()?).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl AppointmentStore for JsonFileStore {
    fn appointments(&self) -> Result<Vec<Appointment>> {
        self.inner.appointments()
    }

    fn exceptions(&self) -> Result<Vec<Exception>> {
        self.inner.exceptions()
    }

    fn appointment(&self, id: &str) -> Result<Option<Appointment>> {
        self.inner.appointment(id)
    }

    fn put_appointment(&mut self, appointment: Appointment) -> Result<()> {
        self.inner.put_appointment(appointment)?;
        self.save()
    }

    fn delete_appointment(&mut self, id: &str) -> Result<()> {
        self.inner.delete_appointment(id)?;
        self.save()
    }

    fn set_status(&mut self, id: &str, status: Status) -> Result<()> {
        self.inner.set_status(id, status)?;
        self.save()
    }

    fn put_exception(&mut self, exception: Exception) -> Result<()> {
        self.inner.put_exception(exception)?;
        self.save()
    }

    fn delete_exception(&mut self, id: &str) -> Result<()> {
        self.inner.delete_exception(id)?;
        self.save()
    }
}
