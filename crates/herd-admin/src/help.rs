use axum::http::header;
use axum::response::{IntoResponse, Response};

const HEADER: &str = "
Herd Proxy Service

The herd service is a replicating HTTP reverse proxy, which makes a
clustering mode simpler and easier for applications exposing the same
REST API.
";

const NODE_GET: &str = "
Get node settings by host and port

+-------------+-----------+----------------------+
| Method      | Operation | URL                  |
+-------------+-----------+----------------------+
| Get Node    | GET       | /nodes/:host/:port   |
| Get Nodes   | GET       | /nodes/:host         |
| Get Nodes   | GET       | /nodes               |
+-------------+-----------+----------------------+

+-----------------+------------------+
| Parameter       | Type             |
+-----------------+------------------+
| host            | string           |
| port            | number           |
| priority        | number           |
| active          | boolean          |
| maintenance     | boolean          |
+-----------------+------------------+
";

const NODE_SET: &str = "
Set node settings by host and port

+-------------+-----------+----------------------+
| Method      | Operation | URL                  |
+-------------+-----------+----------------------+
| Set Node    | PUT       | /nodes/:host/:port   |
| Set Nodes   | PUT       | /nodes               |
+-------------+-----------+----------------------+

+-----------------+------------------+----------+----------------+
| Parameter       | Type             | Required | Default values |
+-----------------+------------------+----------+----------------+
| host            | string           | yes      |                |
| port            | number           | yes      |                |
| priority        | number           | no       | 0              |
| active          | boolean          | no       | false          |
| maintenance     | boolean          | no       | false          |
+-----------------+------------------+----------+----------------+
";

const NODE_DELETE: &str = "
Delete node settings by host and port

+--------------+-----------+----------------------+
| Method       | Operation | URL                  |
+--------------+-----------+----------------------+
| Delete Node  | DELETE    | /nodes/:host/:port   |
| Delete Nodes | DELETE    | /nodes/:host         |
| Delete Nodes | DELETE    | /nodes               |
+--------------+-----------+----------------------+
";

fn text(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// `GET /list`
pub async fn list_all() -> Response {
    text(format!("{HEADER}{NODE_GET}{NODE_SET}{NODE_DELETE}"))
}

/// `GET /list/nodes`
pub async fn list_nodes() -> Response {
    text(format!("{HEADER}{NODE_GET}{NODE_SET}{NODE_DELETE}"))
}

/// `GET /list/nodes/get`
pub async fn list_nodes_get() -> Response {
    text(format!("{HEADER}{NODE_GET}"))
}

/// `GET /list/nodes/set`
pub async fn list_nodes_set() -> Response {
    text(format!("{HEADER}{NODE_SET}"))
}

/// `GET /list/nodes/delete`
pub async fn list_nodes_delete() -> Response {
    text(format!("{HEADER}{NODE_DELETE}"))
}
