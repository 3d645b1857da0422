pub mod defs;

pub use defs::{
    NewsItem, OverlayCard, PostContent, Publisher, PublishError, PublishReceipt,
};
