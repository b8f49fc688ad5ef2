mod error;
mod interleaved;
mod message;
mod parse;
mod request;
mod response;
mod serialize;
mod transport;

pub mod rtp;
pub mod url;

#[cfg(feature = "tokio-codec")]
mod codec;

pub use error::{Error, Result};
pub use interleaved::{
    ChannelId, InterleavedParser, MaybeInterleaved, RequestMaybeInterleaved,
    ResponseMaybeInterleaved,
};
pub use message::{Bytes, Headers, Message, Method, Status, StatusCategory, StatusCode, Uri, Version};
pub use parse::{Parse, Parser, RequestParser, ResponseParser, Status as ParserStatus};
pub use request::Request;
pub use response::{Response, ResponseBuilder};
pub use serialize::Serialize;
pub use transport::{Channel, Lower, Parameter, Port, Transport};

#[cfg(feature = "tokio-codec")]
pub use codec::{AsClient, AsServer, Codec, Target};
