// src/net/mod.rs

//! Native HTTP transport
//!
//! Session, connection and request handles over TCP and rustls, the status
//! observer, response parsing and the header helpers used by downloads.

mod body;
pub mod client;
pub mod headers;
pub mod protocol;
pub mod request;
pub mod response;
pub mod session;
pub mod status;
pub mod url;

pub use body::Framing;
pub use client::{ClientOptions, HttpClient, HttpResponse, SendOptions};
pub use headers::{
    content_length, content_range_start, extract_filename, resolve_filename, supports_partial_download, Headers,
};
pub use protocol::{protocol_enable, HttpProtocols, ProtocolOptions, ProtocolVersion, Rejected, TlsProtocols};
pub use request::Request;
pub use response::MinimalResponse;
pub use session::{make_session, Connection, Method, ProxyConfig, RequestFlags, Session, SessionOptions};
pub use status::{StatusContext, StatusEvent};
pub use self::url::{Scheme, Url};
