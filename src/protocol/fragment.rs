//! Fragment reassembly.
//!
//! A large message may arrive as several wire messages (fragments). Each
//! fragment starts with a fragmentation frame holding an `i64` id:
//! ```text
//! fragment 1: [frag id, BEGIN_FRAGMENT] [header] [frames...]
//! fragment 2: [frag id, 0]              [frames...]
//! fragment N: [frag id, END_FRAGMENT]   [frames...]
//! ```
//! The handler strips the fragmentation frames and concatenates the rest in
//! arrival order. Fragments of different ids may interleave.
//!
//! Messages whose first frame carries both fragment bits are not fragments
//! and should not be passed here.
//!
//! A begin fragment whose end never arrives stays in flight until
//! [`FragmentedMessageHandler::clear`]. The number of such messages is
//! capped; begin fragments past the cap are dropped.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::message::ClientMessage;

/// Default cap on partially assembled messages.
pub const DEFAULT_MAX_IN_FLIGHT_FRAGMENTED: usize = 1024;

/// In-flight fragment state, keyed by fragmentation id.
#[derive(Debug)]
pub struct FragmentedMessageHandler {
    in_flight: HashMap<i64, ClientMessage>,
    max_in_flight: usize,
}

impl Default for FragmentedMessageHandler {
    fn default() -> Self {
        Self::with_max_in_flight(DEFAULT_MAX_IN_FLIGHT_FRAGMENTED)
    }
}

impl FragmentedMessageHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handler holding at most `max_in_flight` partial messages.
    pub fn with_max_in_flight(max_in_flight: usize) -> Self {
        Self {
            in_flight: HashMap::new(),
            max_in_flight,
        }
    }

    /// Feed one fragment. Returns the merged message once its last fragment
    /// has been merged.
    ///
    /// A continuation or end fragment whose id has no open entry is logged
    /// at debug level and dropped.
    pub fn handle(&mut self, mut fragment: ClientMessage) -> Option<ClientMessage> {
        let fragmentation_id = match fragment.fragmentation_id() {
            Ok(id) => id,
            Err(e) => {
                debug!(error = %e, "Dropping fragment without a fragmentation id");
                return None;
            }
        };
        let fragmentation_frame = fragment.drop_fragmentation_frame()?;

        if fragmentation_frame.has_begin_fragment_flag() {
            if self.in_flight.len() >= self.max_in_flight
                && !self.in_flight.contains_key(&fragmentation_id)
            {
                warn!(
                    fragmentation_id,
                    max_in_flight = self.max_in_flight,
                    "Too many fragmented messages in flight, dropping begin fragment"
                );
                return None;
            }
            self.in_flight.insert(fragmentation_id, fragment);
            return None;
        }

        let Some(existing) = self.in_flight.get_mut(&fragmentation_id) else {
            debug!(
                fragmentation_id,
                "Could not find the first fragment of a message, dropping fragment"
            );
            return None;
        };
        existing.merge(fragment);

        if fragmentation_frame.has_end_fragment_flag() {
            return self.in_flight.remove(&fragmentation_id);
        }
        None
    }

    /// Number of messages with a begin fragment but no end fragment yet.
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Forget every partially assembled message.
    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}
