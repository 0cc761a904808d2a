//! Signal primitives for single-particle dark-field spectra.
//!
//! Gap repair, spike removal, zero-phase smoothing, truncation, extrema,
//! asymmetric least squares baselines and small Gaussian fitters. Everything
//! here works on plain `f64` slices sharing one wavelength axis.

pub mod baseline;
pub mod cosmic;
pub mod derivative;
pub mod errors;
pub mod extrema;
pub mod gaussian;
pub mod linalg;
pub mod nan;
pub mod optimize;
pub mod rolling;
pub mod smoothing;
pub mod truncate;

pub use crate::baseline::{
    BaselineConfig,
    als_baseline,
    remove_baseline,
};
pub use crate::cosmic::{
    CosmicRayParams,
    remove_cosmic_rays,
};
pub use crate::derivative::central_difference;
pub use crate::errors::{
    Result,
    SignalError,
};
pub use crate::extrema::{
    detect_maxima,
    detect_minima,
};
pub use crate::gaussian::{
    GaussPeak,
    GaussianFit,
    gaussian,
};
pub use crate::nan::repair_nans;
pub use crate::smoothing::{
    ButterworthLowpass,
    SmoothingConfig,
};
pub use crate::truncate::{
    Truncated,
    truncate,
};
