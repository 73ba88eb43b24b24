//! Identity keys and the reconciliation rules for claiming them.
//!
//! Every connection declares an identity key at attach time. Keys come in
//! two classes: externally-authenticated keys issued by the host
//! environment (all decimal digits) and locally-generated anonymous keys
//! (`u_` prefix). Verification of authenticated keys happens outside this
//! process; by the time a key reaches the resolver it is taken at face
//! value.

mod resolver;

pub use resolver::{
    IdentityClass, LOCAL_KEY_PREFIX, Profile, generate_local_key, is_authenticated_key,
    is_local_key,
};
