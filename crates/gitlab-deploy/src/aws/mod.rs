//! AWS service clients

pub mod ec2;
pub mod iam;

pub use ec2::Ec2Client;
pub use iam::IamClient;
