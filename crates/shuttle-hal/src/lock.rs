//! Two-level locking between the device and its streams.
//!
//! A stream's state can only be locked by presenting a guard of the device
//! lock, so the device lock is always the outer one. The stream guard does
//! not borrow the device guard: the device lock may be released while the
//! stream lock is still held, never the other way around.

use std::ops::{Deref, DerefMut};

use parking_lot::{Mutex, MutexGuard};

/// The outer lock, owned by the device.
#[derive(Debug, Default)]
pub struct DeviceLock<S> {
    state: Mutex<S>,
}

impl<S> DeviceLock<S> {
    pub fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn lock(&self) -> DeviceGuard<'_, S> {
        DeviceGuard {
            guard: self.state.lock(),
        }
    }
}

pub struct DeviceGuard<'a, S> {
    guard: MutexGuard<'a, S>,
}

impl<S> Deref for DeviceGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard
    }
}

impl<S> DerefMut for DeviceGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.guard
    }
}

/// The inner lock, owned by each stream.
#[derive(Debug, Default)]
pub struct StreamLock<T> {
    state: Mutex<T>,
}

impl<T> StreamLock<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Locks the stream. Holding `_device` proves the device lock was taken
    /// first.
    pub fn lock<'a, S>(&'a self, _device: &DeviceGuard<'_, S>) -> MutexGuard<'a, T> {
        self.state.lock()
    }

    /// Locks the stream for operations that never touch device state. The
    /// device lock must not be acquired while the returned guard is alive.
    pub fn lock_detached(&self) -> MutexGuard<'_, T> {
        self.state.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_guard_outlives_device_guard() {
        let device = DeviceLock::new(0u32);
        let stream = StreamLock::new(Vec::<u32>::new());

        let mut dev = device.lock();
        *dev += 1;
        let mut samples = stream.lock(&dev);
        drop(dev);

        // The device is free again while the stream stays locked.
        assert_eq!(*device.lock(), 1);
        samples.push(1);
        drop(samples);
        assert_eq!(stream.lock_detached().len(), 1);
    }
}
