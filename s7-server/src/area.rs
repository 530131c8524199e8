//! Data areas: the contiguous byte ranges the server exposes, each mapped
//! onto an image-table family. Every area carries a staging buffer sized to
//! its byte length; reads transcode through it so a request never observes
//! a half-converted element.

use parking_lot::Mutex;
use plcr_image::BufferType;
use plcr_logger::{info_target, warn_target};

use crate::config::{buffer_type_by_name, Config};
use crate::LOG_TARGET;

/// Protocol area codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AreaKind {
    /// Process inputs (`PE`, 0x81).
    ProcessInput,
    /// Process outputs (`PA`, 0x82).
    ProcessOutput,
    /// Markers (`MK`, 0x83).
    Marker,
    /// Numbered data blocks (`DB`, 0x84).
    DataBlock,
}

impl AreaKind {
    pub fn from_code(code: u8) -> Option<AreaKind> {
        Some(match code {
            0x81 => AreaKind::ProcessInput,
            0x82 => AreaKind::ProcessOutput,
            0x83 => AreaKind::Marker,
            0x84 => AreaKind::DataBlock,
            _ => return None,
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            AreaKind::ProcessInput => "PE",
            AreaKind::ProcessOutput => "PA",
            AreaKind::Marker => "MK",
            AreaKind::DataBlock => "DB",
        }
    }
}

/// Where an area's bytes live in the image tables.
#[derive(Clone, Copy, Debug)]
pub struct Mapping {
    pub ty: BufferType,
    /// First element index; byte offset `o` addresses element
    /// `start + o / element_size`.
    pub start: usize,
}

pub struct Area {
    pub kind: AreaKind,
    /// DB number; zero for the system areas.
    pub number: u16,
    /// Exposed byte length, always a multiple of the element size.
    pub size: usize,
    pub mapping: Mapping,
    pub staging: Mutex<Vec<u8>>,
}

impl Area {
    fn new(kind: AreaKind, number: u16, size_bytes: usize, mapping: Mapping) -> Option<Area> {
        let element = mapping.ty.width().protocol_bytes();
        let size = size_bytes - size_bytes % element;
        if size == 0 {
            warn_target!(
                LOG_TARGET,
                "area {}{} is smaller than one element, dropped",
                kind.label(),
                number
            );
            return None;
        }
        if size != size_bytes {
            warn_target!(
                LOG_TARGET,
                "area {}{} truncated to {size} bytes (element size {element})",
                kind.label(),
                number
            );
        }
        Some(Area {
            kind,
            number,
            size,
            mapping,
            staging: Mutex::new(vec![0; size]),
        })
    }

    pub fn element_size(&self) -> usize {
        self.mapping.ty.width().protocol_bytes()
    }
}

/// The registered areas of one server instance. Built once at `init`;
/// read-only afterwards.
pub struct AreaTable {
    areas: Vec<Area>,
}

impl AreaTable {
    pub fn from_config(config: &Config) -> AreaTable {
        let mut areas = Vec::new();

        let system = [
            (AreaKind::ProcessInput, &config.system_areas.pe),
            (AreaKind::ProcessOutput, &config.system_areas.pa),
            (AreaKind::Marker, &config.system_areas.mk),
        ];
        for (kind, entry) in system {
            let Some(entry) = entry else { continue };
            if !entry.enabled {
                continue;
            }
            let Some(ty) = buffer_type_by_name(&entry.mapping.type_name) else {
                continue;
            };
            let mapping = Mapping {
                ty,
                start: entry.mapping.start_buffer as usize,
            };
            areas.extend(Area::new(kind, 0, entry.size_bytes as usize, mapping));
        }

        for block in &config.data_blocks {
            let Some(ty) = buffer_type_by_name(&block.mapping.type_name) else {
                continue;
            };
            let mapping = Mapping {
                ty,
                start: block.mapping.start_buffer as usize,
            };
            areas.extend(Area::new(
                AreaKind::DataBlock,
                block.db_number as u16,
                block.size_bytes as usize,
                mapping,
            ));
        }

        for area in &areas {
            info_target!(
                LOG_TARGET,
                "area {}{}: {} bytes mapped to {:?} from element {}",
                area.kind.label(),
                area.number,
                area.size,
                area.mapping.ty,
                area.mapping.start
            );
        }
        AreaTable { areas }
    }

    /// Looks an area up by protocol kind and number; the number only
    /// discriminates data blocks.
    pub fn find(&self, kind: AreaKind, number: u16) -> Option<&Area> {
        self.areas
            .iter()
            .find(|area| area.kind == kind && (kind != AreaKind::DataBlock || area.number == number))
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}
