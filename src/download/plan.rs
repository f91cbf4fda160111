//! Partitioning of content into fixed-size byte ranges

use crate::error::SigfetchError;

/// One contiguous byte range assigned to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// First byte offset
    pub start: u64,
    /// Number of bytes
    pub len: u64,
}

impl Packet {
    /// Last byte offset, inclusive
    pub fn end_inclusive(&self) -> u64 {
        self.start + self.len - 1
    }

    /// `Range` header value for this packet
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end_inclusive())
    }
}

/// Validated split of `[0, total_length)` into packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadPlan {
    total_length: u64,
    packet_size: u64,
    workers: usize,
}

impl DownloadPlan {
    /// Validate and build a plan.
    ///
    /// `packet_size` and `workers` must be positive. A zero `total_length`
    /// is allowed and yields no packets.
    pub fn new(total_length: u64, packet_size: u64, workers: usize) -> Result<Self, SigfetchError> {
        if packet_size == 0 {
            return Err(SigfetchError::InvalidPlan("packet size must be positive".to_string()));
        }
        if workers == 0 {
            return Err(SigfetchError::InvalidPlan("worker count must be positive".to_string()));
        }
        Ok(Self {
            total_length,
            packet_size,
            workers,
        })
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn packet_size(&self) -> u64 {
        self.packet_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of packets in the plan
    pub fn packet_count(&self) -> u64 {
        self.total_length.div_ceil(self.packet_size)
    }

    /// Consecutive packets covering the content; the last one is clipped
    pub fn packets(&self) -> impl Iterator<Item = Packet> {
        let total = self.total_length;
        let size = self.packet_size;
        (0..self.packet_count()).map(move |index| {
            let start = index * size;
            Packet {
                start,
                len: size.min(total - start),
            }
        })
    }
}
