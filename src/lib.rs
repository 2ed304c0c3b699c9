// Copyright 2026 BadCompany
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


//! protokoll-mcp: an embedded MCP client runtime.
//!
//! This library connects an application to the protokoll tool server over
//! the Model Context Protocol, either by spawning the server locally over
//! stdio or by talking Streamable HTTP to a remote endpoint, and keeps that
//! connection alive across server crashes.

pub mod config;
pub mod core;
pub mod mcp;
