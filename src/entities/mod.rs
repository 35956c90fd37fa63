pub mod email_otp;
pub mod order;
pub mod product;
pub mod user;
