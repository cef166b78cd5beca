pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use byteorder::{LittleEndian, ReadBytesExt as _, WriteBytesExt as _};
pub use derivative::Derivative;
pub use itertools::{chain, izip, Itertools as _};
pub use lazy_static::lazy_static;
pub use log::{debug, info, warn};
pub use noisy_float::prelude::*;
pub use once_cell::sync::Lazy;
pub use rand::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    cmp,
    collections::{HashMap, HashSet},
    fmt,
    fmt::Debug,
    fs::{self, File},
    io::{self, prelude::*, BufReader, BufWriter, SeekFrom},
    iter, mem,
    ops::{Deref, DerefMut, Range},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        atomic::{self, AtomicBool},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
