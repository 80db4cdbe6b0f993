mod notify;
mod traits;

pub use notify::{BroadcastSink, FanoutSink, TracingSink};
pub use traits::{
    NotificationSink, PersistRequest, PersistenceGateway, RewardDeltas, RewardRequest,
    RewardResolver, SessionIdIssuer, UuidIssuer,
};
