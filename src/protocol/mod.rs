//! Relay wire protocol
//!
//! JSON objects in websocket text frames, one object per frame.
//!
//! ```text
//! client -> server                       server -> client
//! {initialize: true, source_command?}    {stream_id}
//! {subscribe: <stream_id>}               {subscribe: "ok", source_command}
//! {ping: "ping"}                         {pong: "pong"}
//! {payload: <line>}                      {payload: <line>}        (fan-out)
//!                                        {error: {short, msg}}
//! ```

pub mod frame;

pub use frame::{ClientFrame, ErrorBody, ServerFrame};
