pub mod access;
pub mod aggregate;
pub mod document;
pub mod domain;
pub mod fallback;
pub mod feed;
pub mod gateway;
pub mod live;
pub mod memory;
pub mod period;
pub mod ports;
pub mod session;
pub mod views;

pub use access::{AccessDenied, Action};
pub use document::{paths, CollectionPath, DocPath, Document, Fields, IndexSet, Query, SetMode, Snapshot, WriteOp};
pub use domain::{
    Challenge, Checkoff, Entry, FromDocument, Identity, Message, PeriodKind, Profile, Record, Role, Settings, Standard,
    Tier, TierCheckoff, UserCredentials,
};
pub use gateway::{GatewayError, GatewayResult, MutationGateway};
pub use live::{LiveCollection, QueryPlan, ViewState};
pub use memory::MemoryStore;
pub use ports::{CredentialStore, DocumentStore, PortError, PortResult, SnapshotStream};
pub use session::{Session, SessionResolver, SessionState};
