/*
Copyright 2024 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use crate::domain::PublishError;
use async_trait::async_trait;

/// Secondary port - destination for a rendered report
#[async_trait]
pub trait DataPublisher: Send + Sync {
    /// Write an already-rendered report
    async fn publish(&self, rendered: &str) -> Result<(), PublishError>;
}
