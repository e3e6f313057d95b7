//! Raw event handling: the append-only per-firing buffer probe hooks write
//! typed sections into, and the parsing of such buffers back into sections
//! on the consuming side.

use std::mem;

use anyhow::{anyhow, bail, Result};
use log::error;
use plain::Plain;

/// Size of the section stream of a raw event, without its length prefix.
/// Part of the wire format.
pub const RAW_EVENT_DATA_SIZE: usize = 1024 - 2 /* remove the size field */;

/// Id of the collector owning a section. Values are part of the wire
/// format; ids not listed here belong to collectors outside this crate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SectionOwner {
    Ovs = 7,
}

impl SectionOwner {
    pub fn from_u8(val: u8) -> Result<SectionOwner> {
        Ok(match val {
            7 => SectionOwner::Ovs,
            x => bail!("Can't construct a SectionOwner from {}", x),
        })
    }
}

/// Section header preceding each section in the raw event data. Part of the
/// wire format.
#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
pub struct RawSectionHeader {
    pub owner: u8,
    pub data_type: u8,
    pub size: u16,
}

unsafe impl Plain for RawSectionHeader {}

/// Per-firing event buffer. Sections are appended one after the other and
/// never rolled back: a hook failing halfway leaves its earlier sections in
/// place, which the consumer treats as intentional partial reporting.
pub struct RawEvent {
    len: usize,
    data: [u8; RAW_EVENT_DATA_SIZE],
}

impl Default for RawEvent {
    fn default() -> Self {
        RawEvent {
            len: 0,
            data: [0; RAW_EVENT_DATA_SIZE],
        }
    }
}

impl RawEvent {
    pub fn new() -> RawEvent {
        RawEvent::default()
    }

    /// Reserve a section of `size` bytes and return its zeroed payload, or
    /// None if the remaining capacity cannot hold the header and payload.
    pub fn section_slice(
        &mut self,
        owner: SectionOwner,
        data_type: u8,
        size: usize,
    ) -> Option<&mut [u8]> {
        if size == 0 || size > u16::MAX as usize {
            return None;
        }

        let start = self.len + mem::size_of::<RawSectionHeader>();
        let end = start + size;
        if end > RAW_EVENT_DATA_SIZE {
            return None;
        }

        let header = RawSectionHeader {
            owner: owner as u8,
            data_type,
            size: size as u16,
        };
        self.data[self.len..start].copy_from_slice(unsafe { plain::as_bytes(&header) });

        self.len = end;
        let payload = &mut self.data[start..end];
        payload.fill(0);
        Some(payload)
    }

    /// Reserve a typed section and return a writable view of it, or None on
    /// capacity exhaustion.
    pub fn section<T: Plain>(&mut self, owner: SectionOwner, data_type: u8) -> Option<&mut T> {
        let payload = self.section_slice(owner, data_type, mem::size_of::<T>())?;
        plain::from_mut_bytes(payload).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Section stream without the length prefix.
    pub fn sections(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Wire form of the event: length prefix followed by the section
    /// stream, as consumed by [`parse_raw_event`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(mem::size_of::<u16>() + self.len);
        bytes.extend_from_slice(&(self.len as u16).to_ne_bytes());
        bytes.extend_from_slice(&self.data[..self.len]);
        bytes
    }
}

/// Raw section as found while parsing an event buffer.
#[derive(Clone, Default)]
pub struct RawSection<'a> {
    pub header: RawSectionHeader,
    pub data: &'a [u8],
}

/// Walk a raw event buffer (length prefix + section stream) and collect its
/// sections. Malformed trailing data is logged and dropped; sections with
/// an empty payload are skipped.
pub fn parse_raw_event(data: &[u8]) -> Result<Vec<RawSection<'_>>> {
    // First retrieve the buffer length.
    let data_size = data.len();
    if data_size < 2 {
        bail!("Raw event is too small, can't retrieve its size");
    }

    // Then retrieve the raw event full size. Use unwrap below as we know
    // the [..2] bytes are valid and can be converted to [u8; 2].
    let raw_event_size = u16::from_ne_bytes(data[..2].try_into().unwrap()) as usize;
    if raw_event_size == 0 {
        bail!("Raw event is empty");
    }

    // Add sizeof(u16) to the raw event size to take into account the event
    // size field.
    let raw_event_size = raw_event_size + mem::size_of::<u16>();
    if raw_event_size > data_size {
        bail!("Raw event size goes past the buffer length: {raw_event_size} > {data_size}");
    }

    // Cursor is initialized to sizeof(u16) as we already read the raw event
    // size above.
    let mut cursor = 2;
    let mut sections = Vec::new();
    while cursor < raw_event_size {
        let mut section = RawSection::default();
        if plain::copy_from_bytes(&mut section.header, &data[cursor..]).is_err() {
            error!("Can't read raw section header, it goes past the buffer end");
            break;
        }
        cursor += mem::size_of_val(&section.header);

        let section_end = cursor + section.header.size as usize;
        if section.header.size == 0 {
            error!("Section is empty, according to its header");
            continue;
        } else if section_end > raw_event_size {
            error!("Section goes past the buffer: {section_end} > {raw_event_size}");
            break;
        }

        section.data = &data[cursor..section_end];
        cursor = section_end;
        sections.push(section);
    }

    Ok(sections)
}

/// Helper to check a raw section validity and parse it into a structured
/// type.
pub fn parse_raw_section<'a, T: Plain>(raw_section: &RawSection<'a>) -> Result<&'a T> {
    if raw_section.data.len() != mem::size_of::<T>() {
        bail!(
            "Section data is not the expected size ({} != {})",
            raw_section.data.len(),
            mem::size_of::<T>()
        );
    }

    plain::from_bytes(raw_section.data)
        .map_err(|e| anyhow!("Could not access section data: {:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, packed)]
    #[derive(Clone, Copy, Default)]
    struct TestSection {
        field0: u8,
        field1: u32,
    }
    unsafe impl Plain for TestSection {}

    #[test]
    fn reserve_and_parse() {
        let mut event = RawEvent::new();
        assert!(event.is_empty());

        let section = event.section::<TestSection>(SectionOwner::Ovs, 42).unwrap();
        section.field0 = 1;
        section.field1 = 0xdeadbeef;

        let bytes = event.to_bytes();
        let sections = parse_raw_event(&bytes).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].header.owner, SectionOwner::Ovs as u8);
        assert_eq!(sections[0].header.data_type, 42);
        assert_eq!(sections[0].header.size as usize, mem::size_of::<TestSection>());

        let section = parse_raw_section::<TestSection>(&sections[0]).unwrap();
        assert_eq!(section.field0, 1);
        assert_eq!({ section.field1 }, 0xdeadbeef);
    }

    #[test]
    fn sections_are_zeroed() {
        let mut event = RawEvent::new();
        event.data.fill(0xff);

        let payload = event.section_slice(SectionOwner::Ovs, 0, 8).unwrap();
        assert_eq!(payload.len(), 8);
        assert!(payload.iter().all(|b| *b == 0));
    }

    #[test]
    fn capacity_exhaustion_keeps_earlier_sections() {
        let mut event = RawEvent::new();

        let section = event.section::<TestSection>(SectionOwner::Ovs, 1).unwrap();
        section.field0 = 7;

        // Fill the event up; no rollback may happen on the section above.
        while event.section_slice(SectionOwner::Ovs, 2, 128).is_some() {}
        assert!(event.section::<TestSection>(SectionOwner::Ovs, 3).is_none());

        let bytes = event.to_bytes();
        let sections = parse_raw_event(&bytes).unwrap();
        assert_eq!(sections[0].header.data_type, 1);
        assert_eq!(parse_raw_section::<TestSection>(&sections[0]).unwrap().field0, 7);
    }

    #[test]
    fn zero_sized_section() {
        let mut event = RawEvent::new();
        assert!(event.section_slice(SectionOwner::Ovs, 0, 0).is_none());
        assert!(event.is_empty());
    }

    #[test]
    fn parse_invalid_events() {
        // Empty event.
        assert!(parse_raw_event(&[]).is_err());

        // Uncomplete event size.
        assert!(parse_raw_event(&[0]).is_err());

        // Valid event size but empty event.
        assert!(parse_raw_event(&[0, 0]).is_err());

        // Valid event size but incomplete event.
        assert!(parse_raw_event(&[42, 0]).is_err());
        assert!(parse_raw_event(&[2, 0, 42]).is_err());

        // Valid event with a single empty section. Section is skipped.
        let data = [4, 0, SectionOwner::Ovs as u8, 0, 0, 0];
        assert!(parse_raw_event(&data).unwrap().is_empty());

        // Valid event with a section going past the buffer. Section is
        // dropped.
        let data = [4, 0, SectionOwner::Ovs as u8, 0, 4, 0, 42, 42];
        assert!(parse_raw_event(&data).unwrap().is_empty());
    }

    #[test]
    fn parse_section_size_mismatch() {
        let mut event = RawEvent::new();
        event.section_slice(SectionOwner::Ovs, 0, 2).unwrap();

        let bytes = event.to_bytes();
        let sections = parse_raw_event(&bytes).unwrap();
        assert!(parse_raw_section::<TestSection>(&sections[0]).is_err());
    }
}
