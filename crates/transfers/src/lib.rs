//! Inter-store transfer domain module.
//!
//! A transfer moves a quantity of one variant from a source store to a
//! destination store through `pending -> in_transit -> completed`, or ends in
//! `cancelled`. The aggregate only decides status; stock movement bound to
//! each transition is performed by the service layer through the ledger.

pub mod status;
pub mod transfer;

pub use status::TransferStatus;
pub use transfer::{
    CancelTransfer, CreateTransfer, DetachFromOrder, InventoryTransfer, TransferCancelled,
    TransferCommand, TransferCompleted, TransferCreated, TransferDispatched, TransferEvent,
    TransferUnlinkedFromOrder, UpdateTransferStatus,
};
