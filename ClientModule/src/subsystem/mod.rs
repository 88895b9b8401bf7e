//! # Worldsbase Subsystem
//!
//! Table operations against the Worldsbase backend, built on `RequestJson`.
//! Every call authenticates with the configured API key, is tracked in an
//! in-flight registry until it completes, and reports its outcome to the
//! subsystem listeners:
//!
//! - `on_http_request_completed` receives the response text
//! - `on_table_response` receives a typed `TableResponse`
//! - `on_error` receives the status code of a failed call
//!
//! Base URL and API key come from `Settings`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use worldsbase_shared::constants::endpoint;
use worldsbase_shared::{HttpStatusCode, RequestContentType, RequestVerb, Settings};

use crate::json::JsonObject;
use crate::library::percent_encode;
use crate::net::HttpTransport;
use crate::request::RequestJson;

/// One column and the value to write into it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataRow {
    pub column_name: String,
    pub value: String,
}

impl DataRow {
    pub fn new(column_name: &str, value: &str) -> Self {
        Self {
            column_name: column_name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Outcome of a table call
#[derive(Debug, Clone, PartialEq)]
pub struct TableResponse {
    /// Id returned when the call was issued
    pub request_id: u64,
    pub status: HttpStatusCode,
    /// Raw status code, -1 when no response was received
    pub code: i32,
    /// Parsed response object, empty when the body was not a JSON object
    pub body: JsonObject,
    /// Body text as the server sent it
    pub content: String,
}

impl TableResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

// Listener types
type OnHttpRequestCompletedFn = Box<dyn FnMut(&str) + 'static>;
type OnTableResponseFn = Box<dyn FnMut(&TableResponse) + 'static>;
type OnErrorFn = Box<dyn FnMut(u64, i32) + 'static>;

#[derive(Default)]
struct SubsystemListeners {
    on_http_request_completed: Vec<OnHttpRequestCompletedFn>,
    on_table_response: Vec<OnTableResponseFn>,
    on_error: Vec<OnErrorFn>,
}

pub struct WorldsbaseSubsystem {
    settings: Arc<Settings>,
    transport: Rc<dyn HttpTransport>,
    in_flight: Rc<RefCell<HashMap<u64, RequestJson>>>,
    listeners: Rc<RefCell<SubsystemListeners>>,
    next_request_id: Cell<u64>,
}

impl WorldsbaseSubsystem {
    pub fn new(settings: Arc<Settings>, transport: Rc<dyn HttpTransport>) -> Self {
        if settings.base_url.is_empty() {
            warn!("Worldsbase subsystem created without a base URL");
        }
        Self {
            settings,
            transport,
            in_flight: Rc::new(RefCell::new(HashMap::new())),
            listeners: Rc::new(RefCell::new(SubsystemListeners::default())),
            next_request_id: Cell::new(0),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Number of calls still waiting for a response
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.borrow().len()
    }

    pub fn is_in_flight(&self, request_id: u64) -> bool {
        self.in_flight.borrow().contains_key(&request_id)
    }

    //////////////////////////////////////////////////////////////////////////
    // Listeners

    pub fn add_on_http_request_completed(&self, listener: impl FnMut(&str) + 'static) {
        self.listeners
            .borrow_mut()
            .on_http_request_completed
            .push(Box::new(listener));
    }

    pub fn add_on_table_response(&self, listener: impl FnMut(&TableResponse) + 'static) {
        self.listeners.borrow_mut().on_table_response.push(Box::new(listener));
    }

    /// Listener receives the request id and the status code (-1 when no
    /// response arrived)
    pub fn add_on_error(&self, listener: impl FnMut(u64, i32) + 'static) {
        self.listeners.borrow_mut().on_error.push(Box::new(listener));
    }

    //////////////////////////////////////////////////////////////////////////
    // Table operations

    /// Read every row of a table
    pub fn get_table(&self, table_name: &str) -> u64 {
        let url = self.endpoint(&format!("{}{}", endpoint::GET_TABLE, percent_encode(table_name)));
        self.send(RequestVerb::Get, &url, None)
    }

    /// Read the rows of a table where `column_name` equals `column_value`
    pub fn get_value(&self, table_name: &str, column_name: &str, column_value: &str) -> u64 {
        let url = self.endpoint(&format!(
            "{}{}/{}/{}",
            endpoint::GET_TABLE_VALUE,
            percent_encode(table_name),
            percent_encode(column_name),
            percent_encode(column_value)
        ));
        self.send(RequestVerb::Get, &url, None)
    }

    /// Read the rows of a table matching every filter, passed as query
    /// parameters
    pub fn get_filtered_table_values(&self, table_name: &str, filters: &[DataRow]) -> u64 {
        let url = self.endpoint(&format!(
            "{}{}",
            endpoint::GET_FILTERED_TABLE_VALUES,
            percent_encode(table_name)
        ));

        let request = self.create_request(RequestVerb::Get, RequestContentType::UrlEncodedUrl);
        request.with_request_object(|object| {
            for filter in filters {
                object.set_string_field(&filter.column_name, &filter.value);
            }
        });
        self.dispatch(request, &url)
    }

    /// Insert one row built from `rows`
    pub fn insert_data(&self, table_name: &str, rows: &[DataRow]) -> u64 {
        let mut body = JsonObject::new();
        body.set_object_field("data", &data_object(rows));
        body.set_string_field("tableName", table_name);

        let url = self.endpoint(endpoint::INSERT_DATA);
        self.send(RequestVerb::Post, &url, Some(body))
    }

    /// Update the rows where `condition_column` equals `condition_value`
    pub fn update_data(
        &self,
        table_name: &str,
        condition_column: &str,
        condition_value: &str,
        rows: &[DataRow],
    ) -> u64 {
        let mut body = JsonObject::new();
        body.set_string_field("tableName", table_name);
        body.set_string_field("condition", &condition(condition_column, condition_value));
        body.set_object_field("data", &data_object(rows));

        let url = self.endpoint(endpoint::UPDATE_DATA);
        self.send(RequestVerb::Put, &url, Some(body))
    }

    /// Add `value` to `column_name` in the matching rows
    pub fn increment_data(
        &self,
        table_name: &str,
        column_name: &str,
        condition_column: &str,
        condition_value: &str,
        value: i32,
    ) -> u64 {
        let body = step_body(table_name, column_name, condition_column, condition_value, value);
        let url = self.endpoint(endpoint::INCREMENT_DATA);
        self.send(RequestVerb::Post, &url, Some(body))
    }

    /// Subtract `value` from `column_name` in the matching rows
    pub fn decrement_data(
        &self,
        table_name: &str,
        column_name: &str,
        condition_column: &str,
        condition_value: &str,
        value: i32,
    ) -> u64 {
        let body = step_body(table_name, column_name, condition_column, condition_value, value);
        let url = self.endpoint(endpoint::DECREMENT_DATA);
        self.send(RequestVerb::Post, &url, Some(body))
    }

    //////////////////////////////////////////////////////////////////////////
    // Dispatch

    fn endpoint(&self, path: &str) -> String {
        self.settings.endpoint_url(path)
    }

    fn create_request(&self, verb: RequestVerb, content_type: RequestContentType) -> RequestJson {
        let request = RequestJson::new_ext(self.settings.clone(), self.transport.clone(), verb, content_type);
        request.set_api_key(&self.settings.api_key);
        request
    }

    fn send(&self, verb: RequestVerb, url: &str, body: Option<JsonObject>) -> u64 {
        let request = self.create_request(verb, RequestContentType::Json);
        if let Some(body) = body {
            request.set_request_object(body);
        }
        self.dispatch(request, url)
    }

    fn dispatch(&self, request: RequestJson, url: &str) -> u64 {
        let request_id = self.next_request_id.get() + 1;
        self.next_request_id.set(request_id);

        let registry = Rc::downgrade(&self.in_flight);
        let listeners = Rc::downgrade(&self.listeners);
        request.add_on_request_complete(move |request| {
            on_request_finished(request_id, request, &registry, &listeners, true);
        });

        let registry = Rc::downgrade(&self.in_flight);
        let listeners = Rc::downgrade(&self.listeners);
        request.add_on_request_fail(move |request| {
            on_request_finished(request_id, request, &registry, &listeners, false);
        });

        self.in_flight.borrow_mut().insert(request_id, request.clone());
        info!("Worldsbase call {} to {}", request_id, url);
        if !request.process_url(url) {
            self.in_flight.borrow_mut().remove(&request_id);
        }
        request_id
    }
}

fn on_request_finished(
    request_id: u64,
    request: &RequestJson,
    registry: &Weak<RefCell<HashMap<u64, RequestJson>>>,
    listeners: &Weak<RefCell<SubsystemListeners>>,
    succeeded: bool,
) {
    if let Some(registry) = registry.upgrade() {
        registry.borrow_mut().remove(&request_id);
    }

    let Some(listeners) = listeners.upgrade() else {
        debug!("Worldsbase call {} finished after its subsystem was dropped", request_id);
        return;
    };

    let code = request.get_response_code();
    // Listeners are moved out while they run so they may issue new calls
    let mut running = std::mem::take(&mut *listeners.borrow_mut());

    if succeeded {
        let response = TableResponse {
            request_id,
            status: HttpStatusCode::from_code(code),
            code,
            body: request.get_response_object(),
            content: request.get_response_raw_content(),
        };
        debug!("Worldsbase call {} completed ({})", request_id, code);

        for listener in running.on_http_request_completed.iter_mut() {
            listener(&response.content);
        }
        for listener in running.on_table_response.iter_mut() {
            listener(&response);
        }
    } else {
        warn!("Worldsbase call {} failed ({})", request_id, code);
        for listener in running.on_error.iter_mut() {
            listener(request_id, code);
        }
    }

    let mut current = listeners.borrow_mut();
    running
        .on_http_request_completed
        .append(&mut current.on_http_request_completed);
    running.on_table_response.append(&mut current.on_table_response);
    running.on_error.append(&mut current.on_error);
    *current = running;
}

/// JSON object with one string field per row
fn data_object(rows: &[DataRow]) -> JsonObject {
    let mut data = JsonObject::new();
    for row in rows {
        data.set_string_field(&row.column_name, &row.value);
    }
    data
}

fn condition(column: &str, value: &str) -> String {
    format!("{}='{}'", column, value)
}

fn step_body(
    table_name: &str,
    column_name: &str,
    condition_column: &str,
    condition_value: &str,
    value: i32,
) -> JsonObject {
    let mut body = JsonObject::new();
    body.set_string_field("tableName", table_name);
    body.set_string_field("columnName", column_name);
    body.set_string_field("condition", &condition(condition_column, condition_value));
    body.set_string_field("value", &value.to_string());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{HttpRequest, HttpResponse, ManualTransport};
    use serde_json::{json, Value};

    fn setup() -> (WorldsbaseSubsystem, Rc<ManualTransport>) {
        let settings = Settings {
            base_url: "https://db.example.test/".to_string(),
            api_key: "K".to_string(),
            ..Settings::default()
        };
        let transport = Rc::new(ManualTransport::new());
        let subsystem = WorldsbaseSubsystem::new(Arc::new(settings), transport.clone());
        (subsystem, transport)
    }

    fn last(transport: &ManualTransport) -> HttpRequest {
        transport.last_request().unwrap().1
    }

    fn body_json(request: &HttpRequest) -> Value {
        serde_json::from_slice(&request.body).unwrap()
    }

    #[test]
    fn test_get_table() {
        let (subsystem, transport) = setup();
        let id = subsystem.get_table("Users");

        let wire = last(&transport);
        assert_eq!(wire.verb, "GET");
        assert_eq!(wire.url, "https://db.example.test/table/gettable/Users");
        assert_eq!(wire.header("x-api-key"), Some("K"));
        assert_eq!(wire.header("Content-Type"), Some("application/json"));
        assert!(wire.body.is_empty());
        assert!(subsystem.is_in_flight(id));
    }

    #[test]
    fn test_get_value_encodes_segments() {
        let (subsystem, transport) = setup();
        subsystem.get_value("Users", "name", "Ada L");
        assert_eq!(
            last(&transport).url,
            "https://db.example.test/table/gettablevalue/Users/name/Ada%20L"
        );
    }

    #[test]
    fn test_get_filtered_table_values() {
        let (subsystem, transport) = setup();
        subsystem.get_filtered_table_values(
            "Scores",
            &[DataRow::new("level", "3"), DataRow::new("team", "red blue")],
        );

        let wire = last(&transport);
        assert_eq!(
            wire.url,
            "https://db.example.test/table/getfilteredtablevalues/Scores?level=3&team=red%20blue"
        );
        assert_eq!(wire.header("x-api-key"), Some("K"));
    }

    #[test]
    fn test_insert_data_body() {
        let (subsystem, transport) = setup();
        subsystem.insert_data("Users", &[DataRow::new("name", "Ada"), DataRow::new("age", "36")]);

        let wire = last(&transport);
        assert_eq!(wire.verb, "POST");
        assert_eq!(wire.url, "https://db.example.test/table/insertdata");
        assert_eq!(
            body_json(&wire),
            json!({"data": {"name": "Ada", "age": "36"}, "tableName": "Users"})
        );
    }

    #[test]
    fn test_update_data_body() {
        let (subsystem, transport) = setup();
        subsystem.update_data("Users", "id", "7", &[DataRow::new("name", "Grace")]);

        let wire = last(&transport);
        assert_eq!(wire.verb, "PUT");
        assert_eq!(wire.url, "https://db.example.test/table/updatedata/");
        assert_eq!(
            body_json(&wire),
            json!({"tableName": "Users", "condition": "id='7'", "data": {"name": "Grace"}})
        );
    }

    #[test]
    fn test_increment_and_decrement_bodies() {
        let (subsystem, transport) = setup();
        subsystem.increment_data("Scores", "points", "player", "ada", 5);
        let wire = last(&transport);
        assert_eq!(wire.url, "https://db.example.test/table/incrementdata/");
        assert_eq!(
            body_json(&wire),
            json!({"tableName": "Scores", "columnName": "points", "condition": "player='ada'", "value": "5"})
        );

        subsystem.decrement_data("Scores", "points", "player", "ada", 2);
        let wire = last(&transport);
        assert_eq!(wire.verb, "POST");
        assert_eq!(wire.url, "https://db.example.test/table/decrementdata/");
        assert_eq!(body_json(&wire)["value"], json!("2"));
    }

    #[test]
    fn test_completion_broadcasts_and_clears_registry() {
        let (subsystem, transport) = setup();
        let texts = Rc::new(RefCell::new(Vec::new()));
        let responses = Rc::new(RefCell::new(Vec::new()));

        let sink = texts.clone();
        subsystem.add_on_http_request_completed(move |text| sink.borrow_mut().push(text.to_string()));
        let sink = responses.clone();
        subsystem.add_on_table_response(move |response| sink.borrow_mut().push(response.clone()));

        let id = subsystem.get_table("Users");
        transport.complete_next(HttpResponse::new(200, "[{\"id\":1},{\"id\":2}]"));

        assert_eq!(subsystem.in_flight_count(), 0);
        assert_eq!(*texts.borrow(), vec!["[{\"id\":1},{\"id\":2}]".to_string()]);

        let responses = responses.borrow();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].request_id, id);
        assert_eq!(responses[0].status, HttpStatusCode::Ok);
        assert!(responses[0].is_success());
    }

    #[test]
    fn test_object_body_is_broadcast_verbatim() {
        let (subsystem, transport) = setup();
        let texts = Rc::new(RefCell::new(Vec::new()));
        let contents = Rc::new(RefCell::new(Vec::new()));

        let sink = texts.clone();
        subsystem.add_on_http_request_completed(move |text| sink.borrow_mut().push(text.to_string()));
        let sink = contents.clone();
        subsystem.add_on_table_response(move |response| {
            sink.borrow_mut().push((response.content.clone(), response.body.get_integer_field("count")))
        });

        let raw = r#"{"rows":[{"id":1}],"count":1}"#;
        subsystem.get_table("Users");
        transport.complete_next(HttpResponse::new(200, raw));

        assert_eq!(*texts.borrow(), vec![raw.to_string()]);
        assert_eq!(*contents.borrow(), vec![(raw.to_string(), 1)]);
    }

    #[test]
    fn test_failure_reaches_error_listeners() {
        let (subsystem, transport) = setup();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        subsystem.add_on_error(move |id, code| sink.borrow_mut().push((id, code)));

        let id = subsystem.insert_data("Users", &[]);
        let (ticket, _) = transport.last_request().unwrap();
        transport.fail(ticket, None);

        assert_eq!(*errors.borrow(), vec![(id, -1)]);
        assert_eq!(subsystem.in_flight_count(), 0);
    }

    #[test]
    fn test_listener_may_issue_new_call() {
        let (subsystem, transport) = setup();
        let subsystem = Rc::new(subsystem);
        let weak = Rc::downgrade(&subsystem);
        subsystem.add_on_table_response(move |response| {
            if response.request_id == 1 {
                if let Some(subsystem) = weak.upgrade() {
                    subsystem.get_table("Next");
                }
            }
        });

        subsystem.get_table("First");
        transport.complete_next(HttpResponse::new(200, "{}"));
        assert_eq!(last(&transport).url, "https://db.example.test/table/gettable/Next");
        assert_eq!(subsystem.in_flight_count(), 1);
    }
}
