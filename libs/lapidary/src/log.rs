//!
//! log_msg!() is compiled out unless the `debug` feature is enabled, so
//! library consumers stay silent and the deploy binary narrates its steps.
//!

#[cfg(feature = "debug")]
pub fn print_msg(msg: &str) {
    println!("{}", msg);
}

#[cfg(feature = "debug")]
#[macro_export]
macro_rules! log_msg {
    ($fmt:literal $(, $args:expr)*) => {
        $crate::log::print_msg(&format!($fmt $(, $args)*));
    };
}

#[cfg(not(feature = "debug"))]
#[macro_export]
macro_rules! log_msg {
    ($($t:tt)*) => {};
}
