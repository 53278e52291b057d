// SPDX-License-Identifier: MIT

pub mod keel;
pub mod kit;
