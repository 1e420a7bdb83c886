//! Exception index -- groups point exceptions by (appointment id, canonical key).

use std::collections::HashMap;

use crate::clock::CivilTime;
use crate::model::{Exception, ExceptionKind};

/// The effect of the exceptions recorded for one occurrence key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    /// No exception applies.
    None,
    /// The occurrence is removed.
    Skip,
    /// The occurrence keeps its identity but takes a new start and/or duration.
    Move {
        new_start: Option<CivilTime>,
        new_duration_minutes: Option<u32>,
    },
}

/// Lookup of exceptions by owning appointment and canonical key.
#[derive(Debug, Default)]
pub struct ExceptionIndex<'a> {
    by_appointment: HashMap<&'a str, HashMap<CivilTime, Vec<&'a Exception>>>,
}

impl<'a> ExceptionIndex<'a> {
    pub fn new(exceptions: &'a [Exception]) -> Self {
        let mut by_appointment: HashMap<&'a str, HashMap<CivilTime, Vec<&'a Exception>>> =
            HashMap::new();
        for exception in exceptions {
            by_appointment
                .entry(exception.appointment_id.as_str())
                .or_default()
                .entry(exception.original_date_time)
                .or_default()
                .push(exception);
        }
        Self { by_appointment }
    }

    /// All exceptions tied to `(appointment_id, key)`, in insertion order.
    pub fn lookup(&self, appointment_id: &str, key: &CivilTime) -> &[&'a Exception] {
        self.by_appointment
            .get(appointment_id)
            .and_then(|keys| keys.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve what happens to the occurrence at `key`.
    ///
    /// A skip wins over any co-existing move; among several moves the first
    /// recorded one applies.
    pub fn resolve(&self, appointment_id: &str, key: &CivilTime) -> Override {
        let related = self.lookup(appointment_id, key);
        if related.iter().any(|x| x.is_skip()) {
            return Override::Skip;
        }
        related
            .iter()
            .find_map(|x| match x.kind {
                ExceptionKind::Move {
                    new_start,
                    new_duration_minutes,
                } => Some(Override::Move {
                    new_start,
                    new_duration_minutes,
                }),
                ExceptionKind::Skip => None,
            })
            .unwrap_or(Override::None)
    }

    /// Keys of `appointment_id` carrying a move that is not overridden by a skip.
    pub fn moved_keys(&self, appointment_id: &str) -> Vec<CivilTime> {
        let mut keys: Vec<CivilTime> = self
            .by_appointment
            .get(appointment_id)
            .map(|keys| {
                keys.keys()
                    .copied()
                    .filter(|key| matches!(self.resolve(appointment_id, key), Override::Move { .. }))
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }
}
