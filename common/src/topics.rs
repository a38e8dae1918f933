pub const NODE_CONTROLS: &str = "controls";
pub const NODE_STATUS: &str = "status";

pub const PROP_MODE: &str = "mode";
pub const PROP_FAN_SPEED: &str = "fan-speed";
pub const PROP_MY_ZONE: &str = "myzone";
pub const PROP_REQUEST_REFRESH: &str = "requestrefresh";

pub const PROP_TEMP_SETPOINT: &str = "tempsetpoint";
pub const PROP_TEMP_MEASURED: &str = "tempmeasured";
pub const PROP_ZONE_STATE: &str = "zone-state";
pub const PROP_ZONE_MODE: &str = "zone-mode";

pub const PROP_SYSTEM_STATUS: &str = "systemstatus";
pub const PROP_LAST_UPDATE: &str = "lastupdate";
