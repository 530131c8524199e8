mod app_config;
