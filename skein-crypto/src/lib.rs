pub mod hash;
pub mod otp;
