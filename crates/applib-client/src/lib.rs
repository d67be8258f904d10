//! Client engine for applib dashboards.
//!
//! A [`ClientSession`] keeps a self-healing connection to the dashboard
//! server, routes replies to named callbacks, and composes the menu bar and
//! tab strips from declarations the server sends in any order. The
//! [`OfflineCacheManager`] captures a versioned snapshot of the static assets
//! so the dashboard can load without a live connection.

pub mod config;
pub mod connection;
pub mod host;
pub mod offline;
pub mod poller;
pub mod posrep;
pub mod props;
pub mod protocol;
pub mod session;
pub mod ui;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, ConfigError, OfflineConfig, PollConfig};
pub use connection::{
    ConnectionEvent, ConnectionHandle, ConnectionManager, Connector, INITIAL_CONNECT_DELAY, RECONNECT_DELAY,
    TransportError, TransportLink, WsConnector,
};
pub use host::{HostBridge, HostEnd, host_channel};
pub use offline::{
    AssetSource, CacheError, CacheState, CacheStore, CachedResponse, DirStore, FetchError, HttpSource,
    InstallOutcome, MANIFEST_TIMEOUT, MemoryStore, OfflineCacheManager, Origin, Served,
};
pub use poller::Poller;
pub use posrep::{MapLayer, Placemark, PlacemarkWindow};
pub use props::{ClientProps, PropsError, SplitLayout, parse_bool_or, parse_float_or};
pub use protocol::{CallbackHandler, CallbackRegistry, MessageProtocol, RequestError};
pub use session::{ClientSession, HostHook};
pub use ui::{HostOrdering, SortDirection, UiEngine, UiError, UiRenderer};

pub use applib_core::{ConnectionState, Instruction, Request, SessionToken, TabSide};
