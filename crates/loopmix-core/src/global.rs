//! Process-wide mixer registry
//!
//! Hosts that drive the mixer from places without access to a handle (a
//! node bridge, a control socket) install one mixer here and reach it through
//! the convenience calls below. Every call is a no-op returning `false`,
//! `None` or zero while nothing is installed.
//!
//! The registry only holds an `Arc`; installing, replacing or uninstalling
//! never frees a mixer some other thread is still using.

use std::sync::{Arc, PoisonError, RwLock};

use crate::engine::{LevelsSnapshot, LogLine, Mixer, MixerStatus};
use crate::error::ConfigResult;

static GLOBAL_MIXER: RwLock<Option<Arc<Mixer>>> = RwLock::new(None);

/// Install `mixer` as the global mixer, returning the one it replaces
pub fn install(mixer: Arc<Mixer>) -> Option<Arc<Mixer>> {
    log::info!("Installing global mixer");
    GLOBAL_MIXER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(mixer)
}

/// Remove the global mixer
pub fn uninstall() -> Option<Arc<Mixer>> {
    let previous = GLOBAL_MIXER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if previous.is_some() {
        log::info!("Uninstalled global mixer");
    }
    previous
}

/// Remove the global mixer only if it is `mixer`
///
/// Used when tearing down one instance so it does not clear a newer one.
pub fn uninstall_if(mixer: &Arc<Mixer>) -> bool {
    let mut slot = GLOBAL_MIXER.write().unwrap_or_else(PoisonError::into_inner);
    if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, mixer)) {
        *slot = None;
        log::info!("Uninstalled global mixer");
        true
    } else {
        false
    }
}

/// Currently installed mixer
pub fn current() -> Option<Arc<Mixer>> {
    GLOBAL_MIXER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn is_installed() -> bool {
    current().is_some()
}

/// Register a node with a ring of `capacity_frames` frames
pub fn register_node_source(index: usize, capacity_frames: usize) -> bool {
    current().is_some_and(|mixer| {
        registered(index, mixer.register_node_source(index, capacity_frames))
    })
}

/// Register a node with the installed mixer's default capacity
pub fn register_default_node_source(index: usize) -> bool {
    current().is_some_and(|mixer| registered(index, mixer.register_default_node_source(index)))
}

fn registered(index: usize, result: ConfigResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Global register of node {} failed: {}", index, e);
            false
        }
    }
}

/// Push frames to a node; false if rejected or nothing is installed
pub fn push_node_frames(index: usize, data: &[f32], timestamp_ns: u64) -> bool {
    current().is_some_and(|mixer| mixer.push_node_frames(index, data, timestamp_ns).is_ok())
}

pub fn set_node_gain(index: usize, gain: f32) -> bool {
    current().is_some_and(|mixer| mixer.set_node_gain(index, gain).is_ok())
}

pub fn set_node_mute(index: usize, muted: bool) -> bool {
    current().is_some_and(|mixer| mixer.set_node_mute(index, muted).is_ok())
}

pub fn set_source_gain_db(index: usize, db: f32) -> bool {
    current().is_some_and(|mixer| mixer.set_source_gain_db(index, db).is_ok())
}

pub fn set_source_mute(index: usize, muted: bool) -> bool {
    current().is_some_and(|mixer| mixer.set_source_mute(index, muted).is_ok())
}

pub fn set_source_enabled(index: usize, enabled: bool) -> bool {
    current().is_some_and(|mixer| mixer.set_source_enabled(index, enabled).is_ok())
}

pub fn source_is_enabled(index: usize) -> bool {
    current().is_some_and(|mixer| mixer.source_is_enabled(index))
}

pub fn source_count() -> usize {
    current().map_or(0, |mixer| mixer.source_count())
}

pub fn levels() -> Option<LevelsSnapshot> {
    current().map(|mixer| mixer.levels())
}

pub fn status() -> Option<MixerStatus> {
    current().map(|mixer| mixer.status())
}

pub fn pop_log() -> Option<LogLine> {
    current().and_then(|mixer| mixer.pop_log())
}
