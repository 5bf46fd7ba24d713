use crate::LoopOps;

/// RAII guard that detaches a loop device when dropped.
///
/// The repair cycle relies on this so the loop device is released whatever fsck reports.
#[derive(Debug)]
pub struct LoopGuard<'a, H: LoopOps + ?Sized> {
    hal: &'a H,
    loop_device: String,
}

impl<'a, H: LoopOps + ?Sized> LoopGuard<'a, H> {
    pub fn new(hal: &'a H, loop_device: impl Into<String>) -> Self {
        Self {
            hal,
            loop_device: loop_device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.loop_device
    }
}

impl<'a, H: LoopOps + ?Sized> Drop for LoopGuard<'a, H> {
    fn drop(&mut self) {
        match self.hal.losetup_detach(&self.loop_device) {
            Ok(()) => log::debug!("detached {}", self.loop_device),
            Err(err) => log::warn!("loop guard failed to detach {}: {}", self.loop_device, err),
        }
    }
}
