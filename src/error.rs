// Copyright (c) 2025 The RTC-BWE Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error type for bandwidth estimation operations.

use strum_macros::EnumIter;

/// An error occurred while parsing wire data or applying a configuration.
///
/// The estimator ingress itself never fails; malformed feedback is dropped
/// and logged instead. Errors surface only from the codec, the header
/// extension registry, and configuration validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// An internal error that cannot be attributed to the input.
    #[default]
    InternalError,

    /// The provided buffer is too short.
    BufferTooShort,

    /// The provided packet cannot be parsed.
    InvalidPacket,

    /// The configuration is invalid.
    InvalidConfig(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn error_display() {
        for err in Error::iter() {
            assert!(!format!("{}", err).is_empty());
            assert!(std::error::Error::source(&err).is_none());
        }
    }

    #[test]
    fn error_default() {
        assert_eq!(Error::default(), Error::InternalError);
    }
}
