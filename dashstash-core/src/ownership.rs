//! Typed ownership tokens for the backing images.
//!
//! Exactly one token exists at a time and only [`crate::gadget::GadgetManager`] can mint or
//! exchange them. Local mount/repair/archive operations borrow [`LocalAccess`]; exposing the
//! images to the host consumes it and yields [`HostAttached`]. Neither is `Clone`.

/// The images are exposed to the USB host through the gadget.
#[derive(Debug)]
#[must_use = "dropping the token loses track of who owns the backing images"]
pub struct HostAttached {
    _priv: (),
}

/// The gadget is unloaded; the images may be mounted and repaired locally.
#[derive(Debug)]
#[must_use = "dropping the token loses track of who owns the backing images"]
pub struct LocalAccess {
    _priv: (),
}

impl HostAttached {
    pub(crate) fn new() -> Self {
        Self { _priv: () }
    }
}

impl LocalAccess {
    pub(crate) fn new() -> Self {
        Self { _priv: () }
    }
}
