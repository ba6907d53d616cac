pub mod adjust_quantity_command;
pub mod route_action_command;
pub mod scan_code_command;
