//! Structural verification
//!
//! Cross-checks the directory, the free list and the committed metadata
//! regions: every block other than the header has exactly one owner.

use crate::allocator::FreeListAllocator;
use crate::directory::Directory;
use crate::header::Header;
use crate::validation::validate_name;
use serde::Serialize;

/// Result of a structural check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub streams: usize,
    pub total_blocks: u64,
    pub data_blocks: u64,
    pub free_blocks: u64,
    pub metadata_blocks: u64,

    /// Blocks with no owner; wasted space, but not an inconsistency
    pub unreferenced_blocks: u64,

    /// Inconsistencies found, empty for a healthy archive
    pub problems: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Owner {
    Nobody,
    Header,
    Metadata,
    Free,
    Stream(usize),
}

pub(crate) fn verify(
    header: &Header,
    directory: &Directory,
    allocator: &FreeListAllocator,
) -> VerifyReport {
    let block_size = header.block_size;
    let total = allocator.total_blocks();
    let mut owners = vec![Owner::Nobody; total as usize];
    let mut report = VerifyReport {
        streams: directory.len(),
        total_blocks: total,
        ..Default::default()
    };

    if let Some(first) = owners.first_mut() {
        *first = Owner::Header;
    }

    for block in header
        .directory
        .blocks(block_size)
        .chain(header.free_list.blocks(block_size))
    {
        match owners.get_mut(block as usize) {
            Some(slot @ Owner::Nobody) => *slot = Owner::Metadata,
            Some(_) => report
                .problems
                .push(format!("metadata block {} has another owner", block)),
            None => report
                .problems
                .push(format!("metadata block {} out of range", block)),
        }
    }

    for &block in allocator.free_list().iter().chain(allocator.pending()) {
        match owners.get_mut(block as usize) {
            Some(slot @ Owner::Nobody) => *slot = Owner::Free,
            Some(_) => report
                .problems
                .push(format!("free block {} is also in use", block)),
            None => report
                .problems
                .push(format!("free block {} out of range", block)),
        }
    }

    for (index, (name, entry)) in directory.iter().enumerate() {
        if let Err(e) = validate_name(name) {
            report.problems.push(e.to_string());
        }

        let capacity = entry.chain.capacity(block_size);
        if entry.length > capacity {
            report.problems.push(format!(
                "{}: length {} exceeds capacity {}",
                name, entry.length, capacity
            ));
        }

        for &block in entry.chain.blocks() {
            match owners.get_mut(block as usize) {
                Some(slot @ Owner::Nobody) => *slot = Owner::Stream(index),
                Some(Owner::Stream(other)) if *other == index => report
                    .problems
                    .push(format!("{}: block {} appears twice in its chain", name, block)),
                Some(Owner::Free) => report
                    .problems
                    .push(format!("{}: block {} is on the free list", name, block)),
                Some(_) => report
                    .problems
                    .push(format!("{}: block {} has another owner", name, block)),
                None => report.problems.push(format!(
                    "{}: block {} out of range ({} blocks)",
                    name, block, total
                )),
            }
        }
    }

    for owner in &owners {
        match owner {
            Owner::Nobody => report.unreferenced_blocks += 1,
            Owner::Metadata => report.metadata_blocks += 1,
            Owner::Free => report.free_blocks += 1,
            Owner::Stream(_) => report.data_blocks += 1,
            Owner::Header => {}
        }
    }

    report
}
