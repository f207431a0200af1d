use crate::common::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4; // name (32) + root_page_id (4)
const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// HeaderPage is a byte view over the reserved page 0. It stores one record
/// per index: a fixed 32-byte name and the index's current root page ID.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
        self.set_record_count(0);
    }

    pub fn record_count(&self) -> u32 {
        u32::from_le_bytes(
            self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    fn set_record_count(&mut self, count: u32) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&count.to_le_bytes());
    }

    /// Adds a new record. Returns false if the name is too long, already
    /// present, or the page is full.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        if name.len() > NAME_SIZE {
            return false;
        }
        let count = self.record_count() as usize;
        if count >= MAX_RECORDS || self.find_record(name).is_some() {
            return false;
        }

        self.write_record(count, name, root_page_id);
        self.set_record_count(count as u32 + 1);
        true
    }

    /// Updates an existing record in place. Returns false if absent.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        match self.find_record(name) {
            Some(index) => {
                self.write_record(index, name, root_page_id);
                true
            }
            None => false,
        }
    }

    /// Looks up the root page ID recorded for an index name.
    /// Returns None if the name is absent or recorded as invalid.
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let index = self.find_record(name)?;
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        let raw = u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap());
        if raw == INVALID_PAGE_ID.as_u32() {
            None
        } else {
            Some(PageId::new(raw))
        }
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        let count = self.record_count() as usize;
        (0..count).find(|&i| self.record_name(i) == name.as_bytes())
    }

    fn record_name(&self, index: usize) -> &[u8] {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE;
        let raw = &self.data[offset..offset + NAME_SIZE];
        // names are nul-padded to NAME_SIZE
        let end = raw.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        &raw[..end]
    }

    fn write_record(&mut self, index: usize, name: &str, root_page_id: PageId) {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE;
        self.data[offset..offset + NAME_SIZE].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root_page_id.as_u32().to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_page_insert_and_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        assert!(header.insert_record("orders_pk", PageId::new(3)));
        assert_eq!(header.record_count(), 1);
        assert_eq!(header.get_root_id("orders_pk"), Some(PageId::new(3)));
        assert_eq!(header.get_root_id("missing"), None);
    }

    #[test]
    fn test_header_page_duplicate_insert_rejected() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        assert!(header.insert_record("idx", PageId::new(1)));
        assert!(!header.insert_record("idx", PageId::new(2)));
        assert_eq!(header.get_root_id("idx"), Some(PageId::new(1)));
    }

    #[test]
    fn test_header_page_update() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        assert!(!header.update_record("idx", PageId::new(9)));

        header.insert_record("idx", PageId::new(1));
        assert!(header.update_record("idx", PageId::new(9)));
        assert_eq!(header.get_root_id("idx"), Some(PageId::new(9)));
    }

    #[test]
    fn test_header_page_invalid_root_reads_as_none() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        header.insert_record("idx", PageId::new(5));
        header.update_record("idx", INVALID_PAGE_ID);
        assert_eq!(header.get_root_id("idx"), None);
    }

    #[test]
    fn test_header_page_name_too_long() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        let long_name = "x".repeat(NAME_SIZE + 1);
        assert!(!header.insert_record(&long_name, PageId::new(1)));
        assert_eq!(header.record_count(), 0);
    }

    #[test]
    fn test_header_page_multiple_records() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        for i in 0..10u32 {
            assert!(header.insert_record(&format!("index_{}", i), PageId::new(i + 1)));
        }
        for i in 0..10u32 {
            assert_eq!(
                header.get_root_id(&format!("index_{}", i)),
                Some(PageId::new(i + 1))
            );
        }
    }
}
