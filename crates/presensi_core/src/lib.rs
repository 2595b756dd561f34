pub mod domain;
pub mod geo;
pub mod machine;
pub mod memory;
pub mod ports;

pub use domain::{
    AttendanceRecord, AttendanceState, AttendanceStatus, CheckOutPatch, Coordinate, LocalNow,
    NewAttendance, PhotoRef, Profile, ProfileCredentials, Punch, RecordFilter, Role,
};
pub use geo::{
    distance_meters, is_within_radius, Geofence, InvalidCoordinate, DEFAULT_RADIUS_METERS,
};
pub use machine::{AttendanceConfig, AttendanceError, AttendanceResult, AttendanceStateMachine};
pub use memory::InMemoryAttendanceRepository;
pub use ports::{
    AccountService, AttendanceRepository, Clock, DeviceError, LocationProvider, PhotoCapture,
    PortError, PortResult,
};
