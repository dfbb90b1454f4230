/*!
Command handlers for the CLI

- `serve`: run the HTTP/WebSocket server
- `history`: print stored sessions and their messages

Both open the session store described by the configuration. Only `serve`
opens the on-disk cache log.
*/

use crate::config::Config;
use crate::stream::TokenFilter;

pub mod history;
pub mod serve;

/// Token filter selected by the stream configuration
pub fn token_filter(config: &Config) -> TokenFilter {
    if config.stream.double_leading_space {
        TokenFilter::DoubleLeadingSpace
    } else {
        TokenFilter::Identity
    }
}
