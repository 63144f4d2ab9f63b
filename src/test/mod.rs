// RibCore: routing daemon RIB core written in Rust
// Copyright 2022-2024 Tibor Schneider <sctibor@ethz.ch>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::community::Community;

/// Initialize logging once for the tests that want to trace queue runs.
fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assert that the values of a community, read in host order, are strictly
/// ascending.
fn assert_sorted(com: &Community) {
    let values: Vec<u32> = com.values().collect();
    for w in values.windows(2) {
        assert!(w[0] < w[1], "values not strictly ascending: {:?}", values);
    }
}

mod test_cmd;
mod test_community;
mod test_intern;
mod test_serde;
