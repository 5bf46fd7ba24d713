pub mod block;
pub mod gadget;
