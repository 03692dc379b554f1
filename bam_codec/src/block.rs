use std::io::Cursor;

/// An inflated BGZF member, consumed through its cursor.
#[derive(Debug, Default)]
pub(crate) struct Block {
    data: Cursor<Vec<u8>>,
    pub compressed_size: u64,
}

impl Block {
    pub fn data_mut(&mut self) -> &mut Cursor<Vec<u8>> {
        &mut self.data
    }
}
