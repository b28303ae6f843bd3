//! Block-partitioned particle storage for one mesh.
//!
//! A [`MeshStore`] owns `num_blocks` live blocks and as many inbox blocks. Blocks are the
//! unit of parallel work; the inbox collects particles handed over from neighbouring meshes
//! until the transfer phase moves them.

use crate::core::mesh::MeshId;
use crate::core::particle::Particle;
use crate::error::{Error, Result};

/// Unordered bag of particles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleBlock {
    particles: Vec<Particle>,
}

impl ParticleBlock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    #[inline]
    pub fn push(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }

    pub fn cursor(&mut self) -> BlockCursor<'_> {
        BlockCursor {
            particles: &mut self.particles,
            next: 0,
            current: None,
        }
    }

    /// Move every particle out, leaving the block empty.
    pub fn take(&mut self) -> Vec<Particle> {
        std::mem::take(&mut self.particles)
    }
}

/// Single-pass cursor over one block that can remove the particle it last returned.
///
/// Removal swaps the last particle into the freed slot, so the cursor revisits that slot
/// next. Every particle present when the cursor was created is returned exactly once.
#[derive(Debug)]
pub struct BlockCursor<'a> {
    particles: &'a mut Vec<Particle>,
    next: usize,
    current: Option<usize>,
}

impl<'a> BlockCursor<'a> {
    /// Next particle, or `None` once the block is exhausted.
    pub fn next_particle(&mut self) -> Option<&mut Particle> {
        if self.next >= self.particles.len() {
            self.current = None;
            return None;
        }
        let index = self.next;
        self.next += 1;
        self.current = Some(index);
        self.particles.get_mut(index)
    }

    /// Remove the particle most recently returned by [`next_particle`](Self::next_particle).
    ///
    /// Returns `None` if nothing was returned since the last call.
    pub fn remove(&mut self) -> Option<Particle> {
        let index = self.current.take()?;
        let particle = self.particles.swap_remove(index);
        self.next = index;
        Some(particle)
    }
}

/// Cursor over every live block of a store, in block order.
#[derive(Debug)]
pub struct StoreCursor<'a> {
    blocks: &'a mut [ParticleBlock],
    block: usize,
    next: usize,
    current: Option<(usize, usize)>,
}

impl<'a> StoreCursor<'a> {
    pub fn next_particle(&mut self) -> Option<&mut Particle> {
        while self.block < self.blocks.len() {
            if self.next < self.blocks[self.block].len() {
                let (b, i) = (self.block, self.next);
                self.next += 1;
                self.current = Some((b, i));
                return self.blocks[b].particles.get_mut(i);
            }
            self.block += 1;
            self.next = 0;
        }
        self.current = None;
        None
    }

    pub fn remove(&mut self) -> Option<Particle> {
        let (b, i) = self.current.take()?;
        let particle = self.blocks[b].particles.swap_remove(i);
        self.next = i;
        Some(particle)
    }
}

/// Live and inbox blocks of one mesh.
#[derive(Debug, Clone)]
pub struct MeshStore {
    mesh: MeshId,
    pub(crate) blocks: Vec<ParticleBlock>,
    inbox: Vec<ParticleBlock>,
}

/// Index of the first smallest block.
#[inline]
fn smallest(blocks: &[ParticleBlock]) -> usize {
    blocks
        .iter()
        .enumerate()
        .min_by_key(|(_, b)| b.len())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

impl MeshStore {
    /// Errors:
    /// - `Error::InvalidParam` if `num_blocks` is zero.
    pub fn new(mesh: MeshId, num_blocks: usize) -> Result<Self> {
        if num_blocks == 0 {
            return Err(Error::InvalidParam("num_blocks must be >= 1".into()));
        }
        Ok(Self {
            mesh,
            blocks: vec![ParticleBlock::new(); num_blocks],
            inbox: vec![ParticleBlock::new(); num_blocks],
        })
    }

    #[inline]
    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Number of live particles.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(ParticleBlock::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(ParticleBlock::is_empty)
    }

    pub fn block_sizes(&self) -> Vec<usize> {
        self.blocks.iter().map(ParticleBlock::len).collect()
    }

    /// Number of particles waiting in the inbox.
    pub fn inbox_len(&self) -> usize {
        self.inbox.iter().map(ParticleBlock::len).sum()
    }

    /// Append to the smallest live block.
    pub fn add(&mut self, particle: Particle) {
        let b = smallest(&self.blocks);
        self.blocks[b].push(particle);
    }

    /// Append to the smallest inbox block.
    pub fn add_transfer(&mut self, particle: Particle) {
        let b = smallest(&self.inbox);
        self.inbox[b].push(particle);
    }

    /// Drain the inbox, one batch per non-empty inbox block.
    pub fn take_inbox(&mut self) -> Vec<Vec<Particle>> {
        self.inbox
            .iter_mut()
            .filter(|b| !b.is_empty())
            .map(ParticleBlock::take)
            .collect()
    }

    #[inline]
    pub fn block(&self, b: usize) -> Option<&ParticleBlock> {
        self.blocks.get(b)
    }

    pub fn block_cursor(&mut self, b: usize) -> Option<BlockCursor<'_>> {
        self.blocks.get_mut(b).map(ParticleBlock::cursor)
    }

    pub fn cursor(&mut self) -> StoreCursor<'_> {
        StoreCursor {
            blocks: &mut self.blocks,
            block: 0,
            next: 0,
            current: None,
        }
    }

    /// Read-only iteration over every live particle.
    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.blocks.iter().flat_map(ParticleBlock::iter)
    }

    pub fn find(&self, id: u64) -> Option<&Particle> {
        self.iter().find(|p| p.id == id)
    }
}
