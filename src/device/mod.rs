mod prober;

pub use prober::{
    parse_result_parcel, parse_screen_state, prober_for, BinaryResultProber, DeviceProber,
    ScreenState, StateDumpProber,
};
