// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

use url::Url;

/// The resource types addressable through the service protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceType {
    DatabaseAccount,
    Databases,
    Containers,
    Items,
    PartitionKeyRanges,
}

impl ResourceType {
    fn path_segment(&self) -> &'static str {
        match self {
            ResourceType::DatabaseAccount => "",
            ResourceType::Databases => "dbs",
            ResourceType::Containers => "colls",
            ResourceType::Items => "docs",
            ResourceType::PartitionKeyRanges => "pkranges",
        }
    }
}

/// The logical address of a resource, relative to the account root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLink {
    path: String,
    resource_type: ResourceType,
}

impl ResourceLink {
    /// The account root.
    pub fn root() -> Self {
        Self {
            path: String::new(),
            resource_type: ResourceType::DatabaseAccount,
        }
    }

    pub fn database(id: impl AsRef<str>) -> Self {
        Self {
            path: format!("dbs/{}", id.as_ref()),
            resource_type: ResourceType::Databases,
        }
    }

    pub fn container(&self, id: impl AsRef<str>) -> Self {
        debug_assert_eq!(self.resource_type, ResourceType::Databases);
        Self {
            path: format!("{}/colls/{}", self.path, id.as_ref()),
            resource_type: ResourceType::Containers,
        }
    }

    pub fn item(&self, id: impl AsRef<str>) -> Self {
        debug_assert_eq!(self.resource_type, ResourceType::Containers);
        Self {
            path: format!("{}/docs/{}", self.path, id.as_ref()),
            resource_type: ResourceType::Items,
        }
    }

    /// The feed (listing) address of `resource_type` under this resource,
    /// e.g. the partition key range feed of a container.
    pub fn feed(&self, resource_type: ResourceType) -> Self {
        Self {
            path: format!("{}/{}", self.path, resource_type.path_segment()),
            resource_type,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// The absolute URL of this resource under `endpoint`.
    pub fn url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(self.path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }
}
