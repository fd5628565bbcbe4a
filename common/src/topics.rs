pub const TOPIC_CYCLE: &str = "heatloop/controller/cycle";
pub const TOPIC_STATUS: &str = "heatloop/controller/status";
