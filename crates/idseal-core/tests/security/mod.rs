mod entropy_quality;
mod mlock_verification;
mod timing_sidechannel;
mod zeroize_on_free;
