pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_config, parse_config_str};
pub use types::{
    parse_byte_size, ByteSize, ChannelConfig, CoreConfig, DirtyConfig, ErrorLimitConfig,
    ExchangerConfig, PluginConfig, TransformerSpec,
};
pub use validator::validate_config;
