pub mod otp;
pub mod results;
