//! SETTINGS parameters and the `Settings` record (§3, §6).

use crate::error::ArgumentError;
use enum_map::{enum_map, Enum, EnumMap};
use num_derive::{FromPrimitive, ToPrimitive};

/// https://httpwg.org/specs/rfc7540.html#SettingValues plus RFC 8441's
/// `SETTINGS_ENABLE_CONNECT_PROTOCOL`, which SPEC_FULL §3 adds to the
/// teacher's six.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive, Enum)]
#[repr(u16)]
pub enum SettingsParameter {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
    EnableConnectProtocol = 0x8,
}

impl SettingsParameter {
    #[must_use]
    pub fn from_wire(value: u16) -> Option<Self> {
        num_traits::FromPrimitive::from_u16(value)
    }

    #[must_use]
    pub fn to_wire(self) -> u16 {
        num_traits::ToPrimitive::to_u16(&self).expect("SettingsParameter is repr(u16)")
    }
}

pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;
pub const DEFAULT_ENABLE_PUSH: u32 = 1;
pub const DEFAULT_MAX_CONCURRENT_STREAMS: u32 = u32::MAX;
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const DEFAULT_MAX_HEADER_LIST_SIZE: u32 = u32::MAX;
pub const DEFAULT_ENABLE_CONNECT_PROTOCOL: u32 = 0;

pub const MIN_MAX_FRAME_SIZE: u32 = 1 << 14;
pub const MAX_MAX_FRAME_SIZE: u32 = (1 << 24) - 1;

/// A fixed record of the seven negotiable settings (§3). Each side of a
/// connection keeps one `local` and one `remote` copy (§4.6): local defaults
/// and remote defaults both start at the RFC values; the remote record is
/// authoritative for outbound framing decisions only once its SETTINGS frame
/// has been acked by us (we ack immediately on receipt, per §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub header_table_size: u32,
    pub enable_push: bool,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: u32,
    pub enable_connect_protocol: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            enable_push: DEFAULT_ENABLE_PUSH != 0,
            max_concurrent_streams: DEFAULT_MAX_CONCURRENT_STREAMS,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: DEFAULT_MAX_HEADER_LIST_SIZE,
            enable_connect_protocol: DEFAULT_ENABLE_CONNECT_PROTOCOL != 0,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn get(&self, param: SettingsParameter) -> u32 {
        match param {
            SettingsParameter::HeaderTableSize => self.header_table_size,
            SettingsParameter::EnablePush => u32::from(self.enable_push),
            SettingsParameter::MaxConcurrentStreams => self.max_concurrent_streams,
            SettingsParameter::InitialWindowSize => self.initial_window_size,
            SettingsParameter::MaxFrameSize => self.max_frame_size,
            SettingsParameter::MaxHeaderListSize => self.max_header_list_size,
            SettingsParameter::EnableConnectProtocol => u32::from(self.enable_connect_protocol),
        }
    }

    /// Applies one wire-decoded `(parameter, value)` pair. Returns a
    /// human-readable validation failure for values RFC 7540 §6.5.2 (and
    /// RFC 8441) forbid; see DESIGN.md's open-question resolution for which
    /// settings are validated.
    pub fn apply(&mut self, param: SettingsParameter, value: u32) -> Result<(), String> {
        match param {
            SettingsParameter::HeaderTableSize => self.header_table_size = value,
            SettingsParameter::EnablePush => {
                if value > 1 {
                    return Err(format!("invalid ENABLE_PUSH value: {value}"));
                }
                self.enable_push = value != 0;
            }
            SettingsParameter::MaxConcurrentStreams => self.max_concurrent_streams = value,
            SettingsParameter::InitialWindowSize => {
                if value > crate::flow::MAX_WINDOW_SIZE as u32 {
                    return Err(format!("invalid INITIAL_WINDOW_SIZE value: {value}"));
                }
                self.initial_window_size = value;
            }
            SettingsParameter::MaxFrameSize => {
                if !(MIN_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&value) {
                    return Err(format!(
                        "invalid MAX_FRAME_SIZE value: {value} (must be in {MIN_MAX_FRAME_SIZE}..={MAX_MAX_FRAME_SIZE})"
                    ));
                }
                self.max_frame_size = value;
            }
            SettingsParameter::MaxHeaderListSize => self.max_header_list_size = value,
            SettingsParameter::EnableConnectProtocol => self.enable_connect_protocol = value != 0,
        }
        Ok(())
    }

    /// Iterates `(parameter, value)` pairs in wire-encoding order, used both
    /// to build the handshake SETTINGS frame and `put_settings` deltas.
    #[must_use]
    pub fn as_pairs(&self) -> Vec<(SettingsParameter, u32)> {
        ALL_PARAMETERS
            .iter()
            .map(|&p| (p, self.get(p)))
            .collect()
    }
}

pub const ALL_PARAMETERS: [SettingsParameter; 7] = [
    SettingsParameter::HeaderTableSize,
    SettingsParameter::EnablePush,
    SettingsParameter::MaxConcurrentStreams,
    SettingsParameter::InitialWindowSize,
    SettingsParameter::MaxFrameSize,
    SettingsParameter::MaxHeaderListSize,
    SettingsParameter::EnableConnectProtocol,
];

/// A sparse set of settings overrides, as supplied to `connect`'s
/// `client_settings` option or to `put_settings` (§4.7, §6). Backed by
/// `enum_map`, the same storage shape the teacher used for `their_settings`
/// in `src/connection.rs`.
#[derive(Debug, Clone, Copy)]
pub struct SettingsUpdate {
    values: EnumMap<SettingsParameter, Option<u32>>,
}

impl Default for SettingsUpdate {
    fn default() -> Self {
        Self {
            values: enum_map! { _ => None },
        }
    }
}

impl SettingsUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an update from `(name, value)` pairs as `put_settings` takes
    /// them, rejecting unknown names with `ArgumentError` (§4.7).
    pub fn from_named(pairs: impl IntoIterator<Item = (&'static str, u32)>) -> Result<Self, ArgumentError> {
        let mut update = Self::new();
        for (name, value) in pairs {
            let param = parameter_by_name(name)
                .ok_or_else(|| ArgumentError::UnknownSetting(name.to_string()))?;
            update.set(param, value);
        }
        Ok(update)
    }

    pub fn set(&mut self, param: SettingsParameter, value: u32) {
        self.values[param] = Some(value);
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (SettingsParameter, u32)> + '_ {
        ALL_PARAMETERS
            .iter()
            .filter_map(move |&p| self.values[p].map(|v| (p, v)))
    }

    pub fn apply_to(&self, settings: &mut Settings) {
        for (param, value) in self.iter() {
            let _ = settings.apply(param, value);
        }
    }
}

#[must_use]
pub fn parameter_by_name(name: &str) -> Option<SettingsParameter> {
    Some(match name {
        "header_table_size" => SettingsParameter::HeaderTableSize,
        "enable_push" => SettingsParameter::EnablePush,
        "max_concurrent_streams" => SettingsParameter::MaxConcurrentStreams,
        "initial_window_size" => SettingsParameter::InitialWindowSize,
        "max_frame_size" => SettingsParameter::MaxFrameSize,
        "max_header_list_size" => SettingsParameter::MaxHeaderListSize,
        "enable_connect_protocol" => SettingsParameter::EnableConnectProtocol,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rfc() {
        let s = Settings::default();
        assert_eq!(s.header_table_size, 4096);
        assert!(s.enable_push);
        assert_eq!(s.initial_window_size, 65_535);
        assert_eq!(s.max_frame_size, 16_384);
    }

    #[test]
    fn rejects_out_of_range_max_frame_size() {
        let mut s = Settings::default();
        assert!(s.apply(SettingsParameter::MaxFrameSize, 1).is_err());
        assert!(s
            .apply(SettingsParameter::MaxFrameSize, MAX_MAX_FRAME_SIZE + 1)
            .is_err());
        assert!(s.apply(SettingsParameter::MaxFrameSize, MIN_MAX_FRAME_SIZE).is_ok());
    }

    #[test]
    fn update_from_named_rejects_unknown() {
        assert!(SettingsUpdate::from_named([("bogus", 1)]).is_err());
        assert!(SettingsUpdate::from_named([("max_frame_size", 20_000)]).is_ok());
    }
}
