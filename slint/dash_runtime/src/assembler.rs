//! Reassembly of values delivered in fragments.
//!
//! A fragment at offset 0 always starts a new value and drops whatever was in
//! flight. Later fragments must continue exactly where the previous one ended;
//! anything else is rejected without touching the transfer in progress.

use crate::error::AssemblyError;
use crate::pool::{BufferPool, PooledBuffer};

/// Fragments on the wire are counted in 32-bit words.
pub const WORD_BYTES: usize = 4;

#[derive(Debug)]
pub struct ChunkedBufferAssembler {
    pool: BufferPool,
    buffer: Option<PooledBuffer>,
    written: usize,
    complete: bool,
}

impl ChunkedBufferAssembler {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            pool,
            buffer: None,
            written: 0,
            complete: false,
        }
    }

    /// Copy `data` into the value at `offset`. Returns `true` on the fragment
    /// that fills the last byte, and only then.
    pub fn begin_or_continue(
        &mut self,
        offset: usize,
        total: usize,
        data: &[u8],
    ) -> Result<bool, AssemblyError> {
        if offset == 0 {
            if data.len() > total {
                return Err(AssemblyError::Overrun {
                    offset,
                    len: data.len(),
                    total,
                });
            }
            self.reset();
            self.buffer = Some(self.pool.acquire(total)?);
        } else {
            let Some(buffer) = self.buffer.as_ref() else {
                return Err(AssemblyError::NoTransfer { offset });
            };
            if self.complete {
                return Err(AssemblyError::AlreadyComplete);
            }
            if buffer.len() != total {
                return Err(AssemblyError::TotalMismatch {
                    started: buffer.len(),
                    total,
                });
            }
            if offset != self.written {
                return Err(AssemblyError::OutOfOrder {
                    expected: self.written,
                    offset,
                });
            }
            if offset + data.len() > total {
                return Err(AssemblyError::Overrun {
                    offset,
                    len: data.len(),
                    total,
                });
            }
        }

        let Some(buffer) = self.buffer.as_mut() else {
            return Err(AssemblyError::NoTransfer { offset });
        };
        buffer[offset..offset + data.len()].copy_from_slice(data);
        self.written = offset + data.len();
        self.complete = self.written == total;
        Ok(self.complete)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// The finished value, once the last fragment has arrived.
    pub fn assembled(&self) -> Option<&[u8]> {
        if self.complete {
            self.buffer.as_deref()
        } else {
            None
        }
    }

    /// Drop any value, finished or not, and give its bytes back.
    pub fn reset(&mut self) {
        self.buffer = None;
        self.written = 0;
        self.complete = false;
    }
}

/// Little-endian bytes of the wire words, in order.
pub fn words_to_bytes(words: &[i32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assembler() -> ChunkedBufferAssembler {
        ChunkedBufferAssembler::new(BufferPool::new(1 << 16))
    }

    #[test]
    fn completes_once_on_last_fragment() {
        let mut asm = assembler();
        assert_eq!(asm.begin_or_continue(0, 6, &[1, 2]), Ok(false));
        assert_eq!(asm.assembled(), None);
        assert_eq!(asm.begin_or_continue(2, 6, &[3, 4]), Ok(false));
        assert_eq!(asm.begin_or_continue(4, 6, &[5, 6]), Ok(true));
        assert_eq!(asm.assembled(), Some(&[1, 2, 3, 4, 5, 6][..]));

        assert_eq!(
            asm.begin_or_continue(6, 6, &[]),
            Err(AssemblyError::AlreadyComplete)
        );
        assert!(asm.is_complete());
    }

    #[test]
    fn out_of_order_fragment_leaves_transfer_intact() {
        let mut asm = assembler();
        asm.begin_or_continue(0, 6, &[1, 2]).expect("start");

        assert_eq!(
            asm.begin_or_continue(4, 6, &[5, 6]),
            Err(AssemblyError::OutOfOrder {
                expected: 2,
                offset: 4
            })
        );
        assert_eq!(
            asm.begin_or_continue(1, 6, &[9]),
            Err(AssemblyError::OutOfOrder {
                expected: 2,
                offset: 1
            })
        );
        assert_eq!(asm.written(), 2);

        assert_eq!(asm.begin_or_continue(2, 6, &[3, 4, 5, 6]), Ok(true));
        assert_eq!(asm.assembled(), Some(&[1, 2, 3, 4, 5, 6][..]));
    }

    #[test]
    fn overrun_and_total_changes_are_rejected() {
        let mut asm = assembler();
        assert!(matches!(
            asm.begin_or_continue(0, 2, &[1, 2, 3]),
            Err(AssemblyError::Overrun { .. })
        ));

        asm.begin_or_continue(0, 4, &[1, 2]).expect("start");
        assert_eq!(
            asm.begin_or_continue(2, 4, &[3, 4, 5]),
            Err(AssemblyError::Overrun {
                offset: 2,
                len: 3,
                total: 4
            })
        );
        assert_eq!(
            asm.begin_or_continue(2, 8, &[3, 4]),
            Err(AssemblyError::TotalMismatch {
                started: 4,
                total: 8
            })
        );
        assert_eq!(asm.begin_or_continue(2, 4, &[3, 4]), Ok(true));
    }

    #[test]
    fn continuation_without_start_is_rejected() {
        let mut asm = assembler();
        assert_eq!(
            asm.begin_or_continue(4, 8, &[0; 4]),
            Err(AssemblyError::NoTransfer { offset: 4 })
        );
    }

    #[test]
    fn offset_zero_restarts_the_value() {
        let pool = BufferPool::new(64);
        let mut asm = ChunkedBufferAssembler::new(pool.clone());
        asm.begin_or_continue(0, 8, &[1, 1, 1, 1]).expect("first");
        assert_eq!(pool.in_use(), 8);

        assert_eq!(asm.begin_or_continue(0, 4, &[2, 2]), Ok(false));
        assert_eq!(pool.in_use(), 4);
        assert_eq!(asm.begin_or_continue(2, 4, &[3, 3]), Ok(true));
        assert_eq!(asm.assembled(), Some(&[2, 2, 3, 3][..]));

        asm.reset();
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn oversized_value_fails_allocation() {
        let mut asm = ChunkedBufferAssembler::new(BufferPool::new(8));
        assert!(matches!(
            asm.begin_or_continue(0, 16, &[0; 4]),
            Err(AssemblyError::Alloc(_))
        ));
        assert_eq!(asm.written(), 0);
    }

    #[test]
    fn words_become_little_endian_bytes() {
        assert_eq!(
            words_to_bytes(&[0x0403_0201, -1]),
            vec![1, 2, 3, 4, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    proptest! {
        #[test]
        fn partitioned_fragments_reassemble(
            value in prop::collection::vec(any::<u8>(), 1..256),
            cuts in prop::collection::vec(1usize..256, 0..8),
        ) {
            let total = value.len();
            let mut bounds: Vec<usize> = cuts.into_iter().filter(|&c| c < total).collect();
            bounds.push(0);
            bounds.push(total);
            bounds.sort_unstable();
            bounds.dedup();

            let mut asm = assembler();
            let fragments = bounds.len() - 1;
            for (index, window) in bounds.windows(2).enumerate() {
                let done = asm
                    .begin_or_continue(window[0], total, &value[window[0]..window[1]])
                    .expect("in-order fragment");
                prop_assert_eq!(done, index + 1 == fragments);
            }
            prop_assert_eq!(asm.assembled(), Some(&value[..]));
        }
    }
}
