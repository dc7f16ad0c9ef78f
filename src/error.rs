//! Typed error hierarchy for the crate (spec §7). The teacher crate has no
//! error enum of its own (it uses `Option`/`bool` returns throughout); this
//! module follows `thiserror` conventions observed in `eraflo-KhoraEngine`
//! and `freddiehaddad-oxidized`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("failed to read mesh file")]
    Io {
        #[source]
        source: std::io::Error,
    },
    #[error("STL file is truncated or shorter than its declared triangle count")]
    Truncated,
    #[error("STL triangle has non-zero attribute byte count ({0}), which this loader requires to be zero")]
    NonZeroAttributeBytes(u16),
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("a k-d tree build is already in progress in this process")]
    AlreadyBuilding,
}

#[derive(Debug, Error)]
pub enum RenderError {
    /// Covers both PNG encode failures and the underlying file open/write
    /// I/O errors — the `image` crate surfaces both through `ImageError`,
    /// so there is no separate I/O variant to construct (spec §7 "Writer
    /// failures").
    #[error("failed to write output image")]
    Encode {
        #[source]
        source: image::ImageError,
    },
    #[error("more than one input STL file was specified")]
    TooManyInputs,
    #[error("no input STL file was specified")]
    NoInput,
}

#[derive(Debug, Error)]
pub enum CrateError {
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
