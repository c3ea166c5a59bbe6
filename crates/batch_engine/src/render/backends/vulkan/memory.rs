use std::ptr::NonNull;

use ash::vk;

use crate::render::frame::{DeviceError, DeviceResult};

/// A buffer whose memory is persistently mapped and host-coherent
#[derive(Debug)]
pub struct MappedBuffer {
    buffer: vk::Buffer,
    mapped: NonNull<u8>,
    size: u64,
}

impl MappedBuffer {
    /// Wrap a mapped buffer
    ///
    /// # Safety
    ///
    /// `mapped` must point to at least `size` writable bytes of host-coherent
    /// memory bound to `buffer`, mapped for as long as this value is used.
    pub unsafe fn new(buffer: vk::Buffer, mapped: NonNull<u8>, size: u64) -> Self {
        Self { buffer, mapped, size }
    }

    /// Buffer handle
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    /// Mapped size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Copy `bytes` to `offset`, rejecting writes past the end
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> DeviceResult<()> {
        let end = offset.checked_add(bytes.len() as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(DeviceError::SubmissionFailed {
                operation: "upload",
                reason: format!(
                    "{} bytes at offset {} exceed mapped size {}",
                    bytes.len(),
                    offset,
                    self.size
                ),
            });
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.mapped.as_ptr().add(offset as usize),
                bytes.len(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_within_bounds() {
        let mut backing = vec![0u8; 8];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let mut mapped = unsafe { MappedBuffer::new(vk::Buffer::null(), ptr, 8) };
        mapped.write(2, &[7, 8, 9]).unwrap();
        mapped.write(8, &[]).unwrap();
        drop(mapped);
        assert_eq!(backing, vec![0, 0, 7, 8, 9, 0, 0, 0]);
    }

    #[test]
    fn test_write_past_end_rejected() {
        let mut backing = vec![0u8; 4];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let mut mapped = unsafe { MappedBuffer::new(vk::Buffer::null(), ptr, 4) };
        assert!(mapped.write(2, &[1, 2, 3]).is_err());
        assert!(mapped.write(u64::MAX, &[1]).is_err());
        drop(mapped);
        assert_eq!(backing, vec![0; 4]);
    }
}
